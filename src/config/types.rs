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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::responder::Secret;

pub(crate) const DEFAULT_PORT: u16 = 22;
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Connection parameters for one [`Session`](crate::Session).
///
/// Credentials are resolved into a single [`AuthMode`](super::AuthMode) at
/// connect time; see [`SessionConfig::auth_mode`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: Option<Secret>,
    /// Inline private key contents.
    #[serde(default, skip_serializing)]
    pub key: Option<Secret>,
    /// Private key file, read at connect time. Ignored when `key` is set.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default, skip_serializing)]
    pub passphrase: Option<Secret>,
    /// SSH agent socket path. Falls back to `SSH_AUTH_SOCK` when unset.
    #[serde(default)]
    pub agent: Option<PathBuf>,
    #[serde(default)]
    pub agent_forward: bool,
    #[serde(
        default = "default_timeout",
        with = "duration_ms",
        rename = "timeout"
    )]
    pub timeout: Duration,
    /// Remote directory every command runs from.
    #[serde(default)]
    pub base_dir: Option<String>,
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub host_key_check: HostKeyCheck,
}

/// Server host key verification policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyCheck {
    /// Accept any host key.
    #[default]
    None,
    /// Check `~/.ssh/known_hosts`.
    KnownHosts,
    /// Check a specific known_hosts file.
    KnownHostsFile(PathBuf),
    /// Compare against one base64 encoded public key.
    PublicKey(String),
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

impl SessionConfig {
    /// Start building a configuration for `user@host`.
    pub fn builder(host: impl Into<String>, user: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: SessionConfig {
                host: host.into(),
                port: DEFAULT_PORT,
                user: user.into(),
                password: None,
                key: None,
                key_file: None,
                passphrase: None,
                agent: None,
                agent_forward: false,
                timeout: DEFAULT_TIMEOUT,
                base_dir: None,
                host_key_check: HostKeyCheck::None,
            },
        }
    }

    /// Reject configurations that can never connect.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host cannot be empty".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(Error::Config("user cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port cannot be 0".to_string()));
        }
        Ok(())
    }

    /// Base directory, if set and non-empty.
    pub fn base_dir(&self) -> Option<&str> {
        self.base_dir.as_deref().filter(|dir| !dir.is_empty())
    }

    /// The secret written to interactive password prompts.
    pub fn prompt_secret(&self) -> Option<&Secret> {
        self.password.as_ref().filter(|p| !p.is_empty())
    }
}

/// Fluent builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<Secret>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn key(mut self, key: impl Into<Secret>) -> Self {
        self.config.key = Some(key.into());
        self
    }

    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.key_file = Some(path.into());
        self
    }

    pub fn passphrase(mut self, passphrase: impl Into<Secret>) -> Self {
        self.config.passphrase = Some(passphrase.into());
        self
    }

    pub fn agent(mut self, socket: impl Into<PathBuf>) -> Self {
        self.config.agent = Some(socket.into());
        self
    }

    pub fn agent_forward(mut self, forward: bool) -> Self {
        self.config.agent_forward = forward;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn base_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.base_dir = Some(dir.into());
        self
    }

    pub fn host_key_check(mut self, check: HostKeyCheck) -> Self {
        self.config.host_key_check = check;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}
