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

//! SSH transport built on russh.
//!
//! [`RusshConnector`] resolves the target, tries each resolved address until
//! one accepts, authenticates, and hands back a [`RusshTransport`]. Every
//! command gets its own session channel ([`RusshChannel`]).

mod authentication;
mod handler;

use async_trait::async_trait;
use russh::client::{Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Sig};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::{ChannelEvent, InputWriter, ChannelOptions, ConnectParams, Connector, RemoteChannel, Transport};
use crate::error::{Error, Result};

pub use handler::ClientHandler;

/// Terminal requested for pty channels.
const PTY_TERM: &str = "xterm";
const PTY_COLUMNS: u32 = 80;
const PTY_ROWS: u32 = 24;

/// Upper bound on waiting for the session task to finish after a disconnect.
const CLOSE_WAIT: Duration = Duration::from_secs(5);
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Connects over SSH using russh.
#[derive(Clone, Default)]
pub struct RusshConnector {
    config: Arc<Config>,
}

impl RusshConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a non default [`russh::client::Config`].
    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl fmt::Debug for RusshConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusshConnector").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for RusshConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Transport>> {
        let socket_addrs: Vec<_> = tokio::net::lookup_host((params.host.as_str(), params.port))
            .await
            .map_err(Error::AddressInvalid)?
            .collect();

        // Connection attempts modeled on std::net::TcpStream::connect: try each
        // address, keep the last error.
        let mut connect_res = Err(Error::AddressInvalid(io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not resolve to any addresses",
        )));
        for socket_addr in socket_addrs {
            let handler = ClientHandler::new(
                params.host.clone(),
                params.port,
                params.host_key_check.clone(),
            );
            tracing::debug!("Connecting to {}", socket_addr);
            match russh::client::connect(self.config.clone(), socket_addr, handler).await {
                Ok(handle) => {
                    connect_res = Ok(handle);
                    break;
                }
                Err(e) => {
                    tracing::debug!("Connection to {} failed: {}", socket_addr, e);
                    connect_res = Err(e);
                }
            }
        }
        let mut handle = connect_res?;

        authentication::authenticate(&mut handle, &params.user, &params.auth).await?;
        tracing::debug!(host = %params.host, "Connected and authenticated");

        Ok(Box::new(RusshTransport {
            handle,
            agent_forward: params.auth.agent_forward(),
        }))
    }
}

/// An authenticated russh connection.
pub struct RusshTransport {
    handle: Handle<ClientHandler>,
    agent_forward: bool,
}

impl fmt::Debug for RusshTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusshTransport")
            .field("handle", &"Handle<ClientHandler>")
            .field("agent_forward", &self.agent_forward)
            .finish()
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn open_channel(
        &mut self,
        command: &str,
        options: ChannelOptions,
    ) -> Result<Box<dyn RemoteChannel>> {
        let open_error = |e: russh::Error| Error::ChannelOpen {
            command: command.to_string(),
            reason: e.to_string(),
        };

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(open_error)?;

        if self.agent_forward {
            channel.agent_forward(false).await.map_err(open_error)?;
        }

        if options.pty {
            channel
                .request_pty(
                    false,
                    PTY_TERM,
                    PTY_COLUMNS,
                    PTY_ROWS,
                    0,   // pixel width (0 means undefined)
                    0,   // pixel height (0 means undefined)
                    &[], // terminal modes (empty means use defaults)
                )
                .await
                .map_err(open_error)?;
        }

        channel.exec(true, command).await.map_err(open_error)?;

        Ok(Box::new(RusshChannel { channel }))
    }

    async fn end(&mut self) -> Result<()> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(Error::Ssh)
    }

    async fn closed(&mut self) {
        let wait = async {
            while !self.handle.is_closed() {
                tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
            }
        };
        if tokio::time::timeout(CLOSE_WAIT, wait).await.is_err() {
            tracing::warn!("SSH session did not terminate within {:?}", CLOSE_WAIT);
        }
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

/// A session channel running one command.
pub struct RusshChannel {
    channel: Channel<Msg>,
}

impl fmt::Debug for RusshChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusshChannel")
            .field("id", &self.channel.id())
            .finish()
    }
}

#[async_trait]
impl RemoteChannel for RusshChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        while let Some(msg) = self.channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => return Some(ChannelEvent::Stdout(data.to_vec())),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    return Some(ChannelEvent::Stderr(data.to_vec()))
                }
                // The exit status may arrive before the last data, so the
                // caller keeps reading until the channel closes.
                ChannelMsg::ExitStatus { exit_status } => {
                    return Some(ChannelEvent::Exit(exit_status))
                }
                ChannelMsg::ExitSignal {
                    signal_name,
                    core_dumped,
                    ..
                } => {
                    tracing::debug!(
                        core_dumped,
                        "Remote command terminated by signal {:?}",
                        signal_name
                    );
                    return Some(ChannelEvent::Exit(signal_exit_code(&signal_name)));
                }
                _ => {}
            }
        }
        None
    }

    fn input_writer(&mut self) -> InputWriter {
        Box::new(self.channel.make_writer())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| Error::ChannelWrite(e.to_string()))
    }

    async fn close_input(&mut self) -> Result<()> {
        self.channel
            .eof()
            .await
            .map_err(|e| Error::ChannelWrite(e.to_string()))
    }
}

/// Exit code a shell reports for a command killed by `signal`.
fn signal_exit_code(signal: &Sig) -> u32 {
    let number = match signal {
        Sig::HUP => 1,
        Sig::INT => 2,
        Sig::QUIT => 3,
        Sig::ILL => 4,
        Sig::ABRT => 6,
        Sig::FPE => 8,
        Sig::KILL => 9,
        Sig::USR1 => 10,
        Sig::SEGV => 11,
        Sig::PIPE => 13,
        Sig::ALRM => 14,
        Sig::TERM => 15,
        _ => return 255,
    };
    128 + number
}
