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

//! Transport abstraction the session runs commands over.
//!
//! A [`Connector`] establishes and authenticates a [`Transport`]; a transport
//! opens one [`RemoteChannel`] per command. The production implementation is
//! [`RusshConnector`]; tests supply in-memory implementations.

pub mod ssh;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::config::{AuthMode, HostKeyCheck, SessionConfig};
use crate::error::Result;

pub use ssh::{RusshChannel, RusshConnector, RusshTransport};

/// Everything a connector needs to establish a connection.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: AuthMode,
    pub host_key_check: HostKeyCheck,
}

impl ConnectParams {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            auth: config.auth_mode(),
            host_key_check: config.host_key_check.clone(),
        }
    }
}

/// Per-channel options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    pub pty: bool,
}

/// One event read from a command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// Exit status. More output may still follow until the channel closes.
    /// A command killed by a signal reports `128 + signal number`.
    Exit(u32),
}

/// Owned writer feeding a channel's stdin independently of event reads.
pub type InputWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens authenticated transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Transport>>;
}

/// An established, authenticated connection.
#[async_trait]
pub trait Transport: Send {
    /// Open a channel executing `command`.
    async fn open_channel(
        &mut self,
        command: &str,
        options: ChannelOptions,
    ) -> Result<Box<dyn RemoteChannel>>;

    /// Ask the remote side to close the connection. Does not wait for it.
    async fn end(&mut self) -> Result<()>;

    /// Resolve once the connection has terminated.
    async fn closed(&mut self);

    fn is_closed(&self) -> bool;
}

/// A running remote command.
#[async_trait]
pub trait RemoteChannel: Send {
    /// Next event, or `None` once the channel has closed.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// A writer for the remote stdin that can make progress while
    /// [`next_event`](RemoteChannel::next_event) is being awaited.
    fn input_writer(&mut self) -> InputWriter;

    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Close the write side (EOF on the remote stdin).
    async fn close_input(&mut self) -> Result<()>;
}
