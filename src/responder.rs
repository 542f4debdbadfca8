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

//! Interactive password prompt answering.
//!
//! Commands such as `sudo` (run with a pty) print a prompt and wait for a
//! password on stdin. [`PasswordResponder`] watches a channel's stdout and
//! writes the configured secret once it sees something that looks like a
//! prompt.
//!
//! # Known limitation
//! Detection is a plain suffix match on `": "`. Any legitimate output that
//! ends in colon-space before the secret has been sent is treated as a
//! prompt: the secret is written to the channel and that chunk is not
//! forwarded to the stdout handler.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

/// Suffix that marks a password prompt.
pub const PROMPT_SUFFIX: &[u8] = b": ";

/// A password or passphrase that is cleared from memory when dropped.
///
/// Debug output never reveals the value.
#[derive(Clone)]
pub struct Secret {
    inner: SecretString,
}

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        let value: String = value.into();
        Self {
            inner: SecretString::new(value.into_boxed_str()),
        }
    }

    /// Borrow the plain value. Use immediately, do not store.
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.expose_secret().is_empty()
    }

    /// The secret followed by a newline, ready to be written to a prompt.
    pub fn with_newline(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = self.inner.expose_secret().as_bytes().to_vec();
        bytes.push(b'\n');
        Zeroizing::new(bytes)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Secret {}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Zeroizing::new(String::deserialize(deserializer)?);
        Ok(Self::new(value.as_str()))
    }
}

/// What the caller should do with a stdout chunk after the responder saw it.
#[derive(Debug, PartialEq, Eq)]
pub enum PromptAction {
    /// Deliver the chunk to the stdout handler.
    Forward,
    /// Write these bytes to the channel and drop the chunk.
    Answer(Zeroizing<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ResponderState {
    /// No secret configured. Output passes through untouched.
    Disabled,
    /// Watching for a prompt. Only the trailing bytes matter for the suffix
    /// match, so only those are kept.
    WatchingForPrompt { tail: Vec<u8> },
    /// The secret was written. Detection is over for this channel.
    Answered,
}

/// Per-channel prompt detector. Create a new one for every channel.
#[derive(Debug)]
pub struct PasswordResponder {
    secret: Option<Secret>,
    state: ResponderState,
}

impl PasswordResponder {
    pub fn new(secret: Option<Secret>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        let state = if secret.is_some() {
            ResponderState::WatchingForPrompt {
                tail: Vec::with_capacity(PROMPT_SUFFIX.len()),
            }
        } else {
            ResponderState::Disabled
        };
        Self { secret, state }
    }

    /// Feed one stdout chunk through the detector.
    pub fn observe(&mut self, chunk: &[u8]) -> PromptAction {
        let ResponderState::WatchingForPrompt { tail } = &mut self.state else {
            return PromptAction::Forward;
        };

        tail.extend_from_slice(chunk);
        if tail.len() > PROMPT_SUFFIX.len() {
            let excess = tail.len() - PROMPT_SUFFIX.len();
            tail.drain(..excess);
        }

        if tail.as_slice() != PROMPT_SUFFIX {
            return PromptAction::Forward;
        }

        match self.secret.as_ref() {
            Some(secret) => {
                tracing::debug!("Password prompt detected, sending secret");
                let answer = secret.with_newline();
                self.state = ResponderState::Answered;
                PromptAction::Answer(answer)
            }
            None => PromptAction::Forward,
        }
    }

    /// True once the secret has been written on this channel.
    pub fn answered(&self) -> bool {
        self.state == ResponderState::Answered
    }

    pub fn is_enabled(&self) -> bool {
        self.state != ResponderState::Disabled
    }
}
