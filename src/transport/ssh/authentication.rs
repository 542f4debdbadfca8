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

//! Authentication against an open russh handle.
//!
//! Supports the three modes a session can resolve to:
//! - Password authentication
//! - Private key authentication (inline or file, optional passphrase)
//! - SSH agent authentication (explicit socket or `SSH_AUTH_SOCK`)

use russh::client::{Handle, Handler};
use std::sync::Arc;

use crate::config::{AuthMode, KeySource};
use crate::error::Error;
use crate::responder::Secret;

/// Authenticate `username` on `handle` with the given mode.
pub(super) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    auth: &AuthMode,
) -> Result<(), Error> {
    tracing::debug!(user = %username, method = auth.label(), "Authenticating");

    match auth {
        AuthMode::Password(password) => {
            let result = handle
                .authenticate_password(username, password.expose())
                .await?;
            if !result.success() {
                return Err(Error::PasswordWrong);
            }
        }
        AuthMode::Key { key, passphrase } => {
            let private_key = load_private_key(key, passphrase.as_ref())?;
            let result = handle
                .authenticate_publickey(
                    username,
                    russh::keys::PrivateKeyWithHashAlg::new(
                        Arc::new(private_key),
                        handle.best_supported_rsa_hash().await?.flatten(),
                    ),
                )
                .await?;
            if !result.success() {
                return Err(Error::KeyAuthFailed);
            }
        }
        AuthMode::Agent { socket, .. } => {
            authenticate_with_agent(handle, username, socket.as_deref()).await?;
        }
    }

    Ok(())
}

/// Decode a private key. A decode failure with a passphrase present is
/// reported as an incorrect passphrase.
fn load_private_key(
    key: &KeySource,
    passphrase: Option<&Secret>,
) -> Result<russh::keys::PrivateKey, Error> {
    let pass = passphrase.map(Secret::expose);
    let decoded = match key {
        KeySource::Inline(data) => russh::keys::decode_secret_key(data.expose(), pass),
        KeySource::File(path) => russh::keys::load_secret_key(path, pass),
    };

    decoded.map_err(|e| {
        if passphrase.is_some() {
            Error::IncorrectPassphrase(e.to_string())
        } else {
            Error::KeyInvalid(e.to_string())
        }
    })
}

#[cfg(unix)]
async fn authenticate_with_agent<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    socket: Option<&std::path::Path>,
) -> Result<(), Error> {
    use russh::keys::agent::client::AgentClient;

    let mut agent = match socket {
        Some(path) => AgentClient::connect_uds(path).await,
        None => AgentClient::connect_env().await,
    }
    .map_err(|e| Error::AgentConnectionFailed(e.to_string()))?;

    let identities = agent
        .request_identities()
        .await
        .map_err(|e| Error::AgentConnectionFailed(e.to_string()))?;

    if identities.is_empty() {
        return Err(Error::AgentNoIdentities);
    }

    for identity in identities {
        let result = handle
            .authenticate_publickey_with(
                username,
                identity.clone(),
                handle.best_supported_rsa_hash().await?.flatten(),
                &mut agent,
            )
            .await;

        match result {
            Ok(auth_result) if auth_result.success() => return Ok(()),
            Ok(_) => tracing::trace!("Agent identity rejected, trying next"),
            Err(e) => tracing::debug!("Agent identity failed: {}", e),
        }
    }

    Err(Error::AgentAuthenticationFailed)
}

#[cfg(not(unix))]
async fn authenticate_with_agent<H: Handler>(
    _handle: &mut Handle<H>,
    _username: &str,
    _socket: Option<&std::path::Path>,
) -> Result<(), Error> {
    Err(Error::AgentConnectionFailed(
        "SSH agent authentication is only supported on unix platforms".to_string(),
    ))
}
