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

//! Error types shared by the session manager, the queue engine and the
//! transport implementations.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while connecting, authenticating or driving the queue.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid address was provided: {0}")]
    AddressInvalid(io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("Connection was not established within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Password authentication was rejected by the server")]
    PasswordWrong,

    #[error("Public key authentication was rejected by the server")]
    KeyAuthFailed,

    #[error("Unable to load private key: {0}")]
    KeyInvalid(String),

    /// Raised while building key credentials when a passphrase was supplied
    /// but the key could not be decrypted with it.
    #[error("Incorrect passphrase: {0}")]
    IncorrectPassphrase(String),

    #[error("Failed to connect to SSH agent: {0}")]
    AgentConnectionFailed(String),

    #[error("SSH agent has no identities")]
    AgentNoIdentities,

    #[error("SSH agent authentication failed for every identity")]
    AgentAuthenticationFailed,

    #[error("Server host key verification failed")]
    ServerCheckFailed,

    #[error("Failed to open channel for '{command}': {reason}")]
    ChannelOpen { command: String, reason: String },

    #[error("Failed to write to channel: {0}")]
    ChannelWrite(String),

    #[error("Channel for '{0}' closed without reporting an exit status")]
    CommandDidntExit(String),

    #[error("Connection was closed")]
    ConnectionClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures raised while establishing or authenticating the
    /// connection, as opposed to failures of an individual command.
    pub fn is_connection_error(&self) -> bool {
        !matches!(
            self,
            Error::ChannelOpen { .. } | Error::ChannelWrite(_) | Error::CommandDidntExit(_)
        )
    }
}
