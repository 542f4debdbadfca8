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

//! russh client handler: server host key verification.

use russh::client::Handler;

use crate::config::HostKeyCheck;
use crate::error::Error;

/// Verifies the server host key according to a [`HostKeyCheck`] policy.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    host_key_check: HostKeyCheck,
}

impl ClientHandler {
    pub fn new(hostname: String, port: u16, host_key_check: HostKeyCheck) -> Self {
        Self {
            hostname,
            port,
            host_key_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let accepted = match &self.host_key_check {
            HostKeyCheck::None => true,
            HostKeyCheck::PublicKey(key) => {
                let pk = russh::keys::parse_public_key_base64(key)
                    .map_err(|_| Error::ServerCheckFailed)?;
                pk == *server_public_key
            }
            HostKeyCheck::KnownHostsFile(path) => russh::keys::check_known_hosts_path(
                &self.hostname,
                self.port,
                server_public_key,
                path,
            )
            .map_err(|_| Error::ServerCheckFailed)?,
            HostKeyCheck::KnownHosts => {
                russh::keys::check_known_hosts(&self.hostname, self.port, server_public_key)
                    .map_err(|_| Error::ServerCheckFailed)?
            }
        };

        if !accepted {
            tracing::warn!(host = %self.hostname, "Server host key rejected");
        }
        Ok(accepted)
    }
}
