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

//! Authentication mode resolution.
//!
//! A configuration may carry several credentials at once. Exactly one mode is
//! used, chosen by this precedence table:
//!
//! | key | password | passphrase | agent | mode                                   |
//! |-----|----------|------------|-------|----------------------------------------|
//! | set | any      | set        | any   | key, passphrase = passphrase           |
//! | set | set      | unset      | any   | key, passphrase = password             |
//! | set | unset    | unset      | any   | key, no passphrase                     |
//! | -   | set      | any        | any   | password                               |
//! | -   | unset    | any        | any   | agent (configured socket or env)       |
//!
//! Empty strings count as unset.

use std::path::PathBuf;

use super::types::SessionConfig;
use super::utils::expand_tilde;
use crate::responder::Secret;

/// Where a private key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Inline(Secret),
    File(PathBuf),
}

/// The single authentication mode used for a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    Password(Secret),
    Key {
        key: KeySource,
        passphrase: Option<Secret>,
    },
    Agent {
        socket: Option<PathBuf>,
        forward: bool,
    },
}

impl AuthMode {
    /// Short label for logs. Never includes credential material.
    pub fn label(&self) -> &'static str {
        match self {
            AuthMode::Password(_) => "password",
            AuthMode::Key {
                passphrase: Some(_),
                ..
            } => "key+passphrase",
            AuthMode::Key { .. } => "key",
            AuthMode::Agent { .. } => "agent",
        }
    }

    /// Agent forwarding only applies to agent authentication.
    pub fn agent_forward(&self) -> bool {
        matches!(self, AuthMode::Agent { forward: true, .. })
    }
}

fn non_empty(secret: &Option<Secret>) -> Option<Secret> {
    secret.as_ref().filter(|s| !s.is_empty()).cloned()
}

impl SessionConfig {
    /// Resolve the configured credentials into one [`AuthMode`].
    pub fn auth_mode(&self) -> AuthMode {
        let password = non_empty(&self.password);
        let passphrase = non_empty(&self.passphrase);

        let key = non_empty(&self.key).map(KeySource::Inline).or_else(|| {
            self.key_file
                .as_ref()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| KeySource::File(expand_tilde(p)))
        });

        if let Some(key) = key {
            return AuthMode::Key {
                key,
                passphrase: passphrase.or(password),
            };
        }

        if let Some(password) = password {
            return AuthMode::Password(password);
        }

        AuthMode::Agent {
            socket: self
                .agent
                .as_ref()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| expand_tilde(p)),
            forward: self.agent_forward,
        }
    }
}
