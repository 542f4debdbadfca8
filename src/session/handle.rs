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

//! Control requests delivered to a running session.
//!
//! Handlers run while the session is mutably borrowed by its run loop, so
//! they cannot call [`Session`](crate::Session) methods directly. A
//! [`SessionHandle`] queues requests instead; the run loop consumes them
//! between commands and while a channel is in flight. Requests sent while no
//! run is in progress are applied by the next `Session` call that touches the
//! queue.

use std::fmt;
use tokio::sync::mpsc;

use crate::error::Result;

pub(crate) type ResetCallback = Box<dyn FnOnce(Result<()>) + Send>;

pub(crate) enum ControlRequest {
    End,
    Reset(Option<ResetCallback>),
    SetBaseDir(Option<String>),
}

impl fmt::Debug for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRequest::End => f.write_str("End"),
            ControlRequest::Reset(_) => f.write_str("Reset"),
            ControlRequest::SetBaseDir(dir) => f.debug_tuple("SetBaseDir").field(dir).finish(),
        }
    }
}

/// Cloneable control surface for a [`Session`](crate::Session).
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<ControlRequest>,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ControlRequest>) -> Self {
        Self { tx }
    }

    /// A handle whose requests go nowhere.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    fn send(&self, request: ControlRequest) -> bool {
        match self.tx.send(request) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Session is gone, dropping {:?}", e.0);
                false
            }
        }
    }

    /// Close the connection, abandoning the running command. Records that
    /// have not started stay queued for the next `start`.
    pub fn end(&self) -> bool {
        self.send(ControlRequest::End)
    }

    /// Close the connection, wait for it to terminate, empty the queue, then
    /// call `on_done`. No command queued before the request runs afterwards.
    pub fn reset(&self, on_done: impl FnOnce(Result<()>) + Send + 'static) -> bool {
        self.send(ControlRequest::Reset(Some(Box::new(on_done))))
    }

    /// Change the base directory for commands that have not started yet.
    pub fn set_base_dir(&self, dir: impl Into<String>) -> bool {
        self.send(ControlRequest::SetBaseDir(Some(dir.into())))
    }

    /// Run commands that have not started yet from the login directory.
    pub fn clear_base_dir(&self) -> bool {
        self.send(ControlRequest::SetBaseDir(None))
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
