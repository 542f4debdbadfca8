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

//! Sequential remote command queue over a single SSH connection.

pub mod command;
pub mod config;
pub mod error;
pub mod queue;
pub mod responder;
pub mod session;
pub mod transport;
pub mod utils;

pub use command::{CommandRecord, ExecOptions};
pub use config::{AuthMode, HostKeyCheck, KeySource, SessionConfig, SessionConfigBuilder};
pub use error::{Error, Result};
pub use queue::{ExitContext, ExitDecision, QueueBuilder};
pub use responder::{PasswordResponder, PromptAction, Secret};
pub use session::{
    ConnectionState, EventKind, ListenerId, RunOutcome, RunSummary, Session, SessionEvent,
    SessionHandle, StartOptions,
};
