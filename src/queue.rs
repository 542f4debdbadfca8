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

//! The command queue and exit-time continuation rules.
//!
//! After a command exits, its exit handler receives an [`ExitContext`] with a
//! [`QueueBuilder`] staging area and returns an [`ExitDecision`]. The queue
//! then commits the staged records and the decision in one step:
//!
//! - [`ExitDecision::Continue`]: staged records are appended, then the next
//!   record runs (or the connection closes after the last one).
//! - [`ExitDecision::Halt`]: everything remaining is abandoned, staged records
//!   included, and the connection closes.
//! - [`ExitDecision::Replace`]: the staged records become the entire remaining
//!   plan and run from the start. An empty staging area halts.

use crate::command::{CommandRecord, ExecOptions};
use crate::session::SessionHandle;

/// What the queue does after a command's exit handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitDecision {
    #[default]
    Continue,
    Halt,
    Replace,
}

impl From<bool> for ExitDecision {
    /// `true` continues, `false` halts.
    fn from(proceed: bool) -> Self {
        if proceed {
            ExitDecision::Continue
        } else {
            ExitDecision::Halt
        }
    }
}

impl From<()> for ExitDecision {
    fn from(_: ()) -> Self {
        ExitDecision::Continue
    }
}

/// Records staged by an exit handler, committed once the handler returns.
#[derive(Debug, Default)]
pub struct QueueBuilder {
    records: Vec<CommandRecord>,
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a command built the same way as [`Session::exec`](crate::Session::exec).
    pub fn exec(&mut self, command: impl AsRef<str>, options: ExecOptions) -> &mut Self {
        self.records.push(CommandRecord::new(command, options));
        self
    }

    pub fn push(&mut self, record: CommandRecord) -> &mut Self {
        self.records.push(record);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn into_records(self) -> Vec<CommandRecord> {
        self.records
    }
}

/// Everything an exit handler gets to see and change.
#[derive(Debug)]
pub struct ExitContext {
    code: u32,
    stdout: String,
    stderr: String,
    queued: usize,
    staged: QueueBuilder,
    session: SessionHandle,
}

impl ExitContext {
    pub(crate) fn new(
        code: u32,
        stdout: String,
        stderr: String,
        queued: usize,
        session: SessionHandle,
    ) -> Self {
        Self {
            code,
            stdout,
            stderr,
            queued,
            staged: QueueBuilder::new(),
            session,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(code: u32, stdout: String, stderr: String, queued: usize) -> Self {
        Self::new(code, stdout, stderr, queued, SessionHandle::detached())
    }

    /// Remote exit status.
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Full stdout of the command, prompt answers excluded.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Full stderr of the command.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Number of records in the queue when the command exited, this one included.
    pub fn queued(&self) -> usize {
        self.queued
    }

    /// Staging area for follow-up commands.
    pub fn queue(&mut self) -> &mut QueueBuilder {
        &mut self.staged
    }

    /// Control handle for the running session (`end`, `reset`).
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub(crate) fn into_staged(self) -> QueueBuilder {
        self.staged
    }
}

/// Where execution goes after an exit has been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Continuation {
    /// Run the record at this index.
    Run(usize),
    /// The last record finished and nothing follows.
    Completed,
    /// The plan was abandoned.
    Halted,
}

/// Ordered records plus the index of the one executing or about to execute.
#[derive(Debug, Default)]
pub struct CommandQueue {
    records: Vec<CommandRecord>,
    cursor: usize,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: CommandRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.cursor = 0;
    }

    /// Command text of every queued record, in order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(CommandRecord::command)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut CommandRecord> {
        self.records.get_mut(index)
    }

    /// Position the cursor at `index`. Returns false when out of range.
    pub(crate) fn seek(&mut self, index: usize) -> bool {
        if index < self.records.len() {
            self.cursor = index;
            true
        } else {
            false
        }
    }

    /// Drop every record up to and including `index`, keeping the rest.
    pub(crate) fn retire_through(&mut self, index: usize) {
        let end = (index + 1).min(self.records.len());
        self.records.drain(..end);
        self.cursor = 0;
    }

    /// Apply an exit handler's decision for the record at `index`.
    pub(crate) fn commit(
        &mut self,
        index: usize,
        decision: ExitDecision,
        staged: QueueBuilder,
    ) -> Continuation {
        let staged = staged.into_records();

        match decision {
            ExitDecision::Continue => {
                if !staged.is_empty() {
                    tracing::debug!("Appending {} staged command(s)", staged.len());
                }
                self.records.extend(staged);
                let next = index + 1;
                if self.seek(next) {
                    Continuation::Run(next)
                } else {
                    self.clear();
                    Continuation::Completed
                }
            }
            ExitDecision::Halt => {
                if !staged.is_empty() {
                    tracing::warn!(
                        "Exit handler halted the queue; discarding {} staged command(s)",
                        staged.len()
                    );
                }
                let abandoned = self.records.len().saturating_sub(index + 1);
                if abandoned > 0 {
                    tracing::debug!("Abandoning {} queued command(s)", abandoned);
                }
                self.clear();
                Continuation::Halted
            }
            ExitDecision::Replace => {
                self.clear();
                if staged.is_empty() {
                    tracing::debug!("Replace requested with no staged commands; halting");
                    return Continuation::Halted;
                }
                tracing::debug!("Replacing queue with {} staged command(s)", staged.len());
                self.records = staged;
                Continuation::Run(0)
            }
        }
    }
}
