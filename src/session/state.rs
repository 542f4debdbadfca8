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

use std::fmt;

/// Lifecycle of a session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport yet, or a fresh one after reset.
    #[default]
    Unconnected,
    Connecting,
    /// Authenticated, no command running.
    Ready,
    /// A command channel is open.
    Executing,
    /// Close requested, waiting for the transport to go away.
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Unconnected, Connecting)
                | (Connecting, Ready)
                | (Connecting, Closed)
                | (Ready, Executing)
                | (Ready, Closing)
                | (Executing, Executing)
                | (Executing, Closing)
                | (Closing, Closed)
                | (Closed, Connecting)
                | (Closed, Unconnected)
                | (_, Closed)
        )
    }

    /// A connection attempt or run is in progress.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Ready | ConnectionState::Executing
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unconnected => "unconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Executing => "executing",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Apply `next` if legal; otherwise log and keep the current state.
pub(crate) fn transition(state: &mut ConnectionState, next: ConnectionState) {
    if state.can_transition_to(next) {
        tracing::trace!("Connection state {} -> {}", state, next);
        *state = next;
    } else {
        tracing::warn!("Ignoring illegal connection state transition {} -> {}", state, next);
    }
}
