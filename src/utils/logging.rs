// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use tracing_subscriber::EnvFilter;

/// Create an environment filter based on verbosity level
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // RUST_LOG wins so russh internals can be inspected directly
        EnvFilter::from_default_env()
    } else {
        match verbosity {
            0 => EnvFilter::new("sshq=warn"),
            1 => EnvFilter::new("sshq=info"),
            // Include russh debug logs for SSH troubleshooting
            2 => EnvFilter::new("sshq=debug,russh=debug"),
            _ => EnvFilter::new("sshq=trace,russh=trace"),
        }
    }
}

/// Install a console subscriber for the given verbosity.
///
/// Returns false when a global subscriber is already installed, in which case
/// the existing one is left alone. Embedding applications that configure
/// tracing themselves never need to call this.
pub fn init_logging(verbosity: u8) -> bool {
    let filter = create_env_filter(verbosity);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
