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

//! Session event listeners.

use std::fmt;

/// Events observable through [`Session::on`](crate::Session::on).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport connected and authenticated.
    Ready,
    /// A transport level failure, or a command that could not complete.
    Error { message: String },
    /// The transport closed.
    Close,
    CommandStart { index: usize, command: String },
    CommandExit {
        index: usize,
        command: String,
        code: u32,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Ready => EventKind::Ready,
            SessionEvent::Error { .. } => EventKind::Error,
            SessionEvent::Close => EventKind::Close,
            SessionEvent::CommandStart { .. } => EventKind::CommandStart,
            SessionEvent::CommandExit { .. } => EventKind::CommandExit,
        }
    }

    pub(crate) fn error(err: &impl fmt::Display) -> Self {
        SessionEvent::Error {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Error,
    Close,
    CommandStart,
    CommandExit,
}

/// Identifies a registered listener for [`Session::off`](crate::Session::off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&SessionEvent) + Send>;

#[derive(Default)]
pub(crate) struct EventBus {
    listeners: Vec<(ListenerId, EventKind, Listener)>,
    next_id: u64,
}

impl EventBus {
    pub(crate) fn on(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, kind, listener));
        id
    }

    pub(crate) fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Deliver to every listener of the event's kind, in registration order.
    pub(crate) fn emit(&mut self, event: SessionEvent) {
        let kind = event.kind();
        for (_, listener_kind, listener) in self.listeners.iter_mut() {
            if *listener_kind == kind {
                listener(&event);
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
