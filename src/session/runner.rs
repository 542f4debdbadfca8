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

//! The queue run loop.
//!
//! Commands run strictly one at a time: command `i + 1` does not open a
//! channel until command `i` has closed and its exit decision has been
//! committed. A stdin payload is fed through its own writer while output is
//! being read, so neither side waits on the other. Control requests from a [`SessionHandle`] are taken before each
//! command, while a channel is in flight, and right after an exit handler
//! returns; a terminal request (`end`, `reset`) wins over the handler's
//! decision.

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use super::events::{EventBus, SessionEvent};
use super::handle::{ControlRequest, ResetCallback, SessionHandle};
use super::state::{transition, ConnectionState};
use crate::command::effective_command;
use crate::error::Error;
use crate::queue::{CommandQueue, Continuation, ExitContext};
use crate::responder::{PasswordResponder, PromptAction, Secret};
use crate::transport::{ChannelEvent, ChannelOptions, RemoteChannel, Transport};

/// Why a run stopped.
pub(crate) enum Stop {
    Completed,
    Halted,
    ChannelOpenFailed { index: usize },
    ChannelLost { index: usize },
    Ended,
    Reset(Option<ResetCallback>),
}

enum Step {
    Continue(Continuation),
    Stop(Stop),
}

enum Wake {
    Channel(Option<ChannelEvent>),
    Control(ControlRequest),
    InputWritten(std::io::Result<()>),
}

/// Borrowed view of a session for the duration of one run.
pub(crate) struct QueueRunner<'a> {
    pub(crate) queue: &'a mut CommandQueue,
    pub(crate) transport: &'a mut dyn Transport,
    pub(crate) events: &'a mut EventBus,
    pub(crate) control: &'a mut mpsc::UnboundedReceiver<ControlRequest>,
    pub(crate) state: &'a mut ConnectionState,
    pub(crate) base_dir: &'a mut Option<String>,
    pub(crate) secret: Option<Secret>,
    pub(crate) handle: SessionHandle,
    pub(crate) executed: usize,
}

impl QueueRunner<'_> {
    /// Run the queue from `start` until it completes, halts or is interrupted.
    pub(crate) async fn run(&mut self, start: usize) -> Stop {
        let mut index = start;
        loop {
            if let Some(stop) = self.take_control_requests() {
                if index > 0 {
                    self.queue.retire_through(index - 1);
                }
                return stop;
            }

            if index >= self.queue.len() {
                return Stop::Completed;
            }

            match self.execute(index).await {
                Step::Continue(Continuation::Run(next)) => index = next,
                Step::Continue(Continuation::Completed) => return Stop::Completed,
                Step::Continue(Continuation::Halted) => return Stop::Halted,
                Step::Stop(stop) => return stop,
            }
        }
    }

    async fn execute(&mut self, index: usize) -> Step {
        self.queue.seek(index);
        let queued = self.queue.len();
        let base_dir = self.base_dir.clone();
        let Some(record) = self.queue.get_mut(index) else {
            return Step::Continue(Continuation::Completed);
        };

        let command = effective_command(base_dir.as_deref(), record.command());
        let options = ChannelOptions { pty: record.pty() };
        transition(self.state, ConnectionState::Executing);
        tracing::debug!(index, command = %command, pty = options.pty, "Executing command");

        let mut channel = match self.transport.open_channel(&command, options).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(index, "Failed to open channel: {}", e);
                record.notify_stderr(&e.to_string());
                self.events.emit(SessionEvent::error(&e));
                self.queue.retire_through(index);
                return Step::Stop(Stop::ChannelOpenFailed { index });
            }
        };

        record.notify_start();
        self.executed += 1;
        self.events.emit(SessionEvent::CommandStart {
            index,
            command: record.command().to_string(),
        });

        let mut feed = record.input().map(|input| {
            let mut writer = channel.input_writer();
            let input = input.to_vec();
            Box::pin(async move {
                writer.write_all(&input).await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            })
        });

        let mut responder = PasswordResponder::new(self.secret.clone());
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        loop {
            let wake = tokio::select! {
                biased;
                Some(request) = self.control.recv() => Wake::Control(request),
                event = channel.next_event() => Wake::Channel(event),
                written = async {
                    match feed.as_mut() {
                        Some(feed) => feed.await,
                        None => Ok(()),
                    }
                }, if feed.is_some() => Wake::InputWritten(written),
            };

            match wake {
                Wake::Channel(Some(ChannelEvent::Stdout(chunk))) => {
                    match responder.observe(&chunk) {
                        PromptAction::Answer(reply) => {
                            if let Err(e) = channel.write(&reply).await {
                                tracing::warn!(index, "Failed to answer password prompt: {}", e);
                            }
                        }
                        PromptAction::Forward => {
                            tracing::trace!(index, bytes = chunk.len(), "stdout");
                            stdout.extend_from_slice(&chunk);
                            record.notify_stdout(&String::from_utf8_lossy(&chunk));
                        }
                    }
                }
                Wake::Channel(Some(ChannelEvent::Stderr(chunk))) => {
                    tracing::trace!(index, bytes = chunk.len(), "stderr");
                    stderr.extend_from_slice(&chunk);
                    record.notify_stderr(&String::from_utf8_lossy(&chunk));
                }
                Wake::Channel(Some(ChannelEvent::Exit(code))) => exit_status = Some(code),
                Wake::Channel(None) => break,
                Wake::InputWritten(written) => {
                    feed = None;
                    let closed = match written {
                        Ok(()) => channel.close_input().await,
                        Err(e) => Err(Error::ChannelWrite(e.to_string())),
                    };
                    if let Err(e) = closed {
                        tracing::warn!(index, "Failed to deliver stdin payload: {}", e);
                        self.events.emit(SessionEvent::error(&e));
                    }
                }
                Wake::Control(ControlRequest::SetBaseDir(dir)) => *self.base_dir = dir,
                Wake::Control(request) => {
                    drop(channel);
                    tracing::warn!(index, "Abandoning running command: {:?}", request);
                    self.events.emit(SessionEvent::error(&Error::ConnectionClosed));
                    self.queue.retire_through(index);
                    return Step::Stop(match request {
                        ControlRequest::Reset(on_done) => Stop::Reset(on_done),
                        _ => Stop::Ended,
                    });
                }
            }
        }
        drop(feed);
        drop(channel);

        let Some(code) = exit_status else {
            let err = Error::CommandDidntExit(record.command().to_string());
            tracing::warn!(index, "{}", err);
            self.events.emit(SessionEvent::error(&err));
            self.queue.retire_through(index);
            return Step::Stop(Stop::ChannelLost { index });
        };

        let mut context = ExitContext::new(
            code,
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
            queued,
            self.handle.clone(),
        );
        let decision = record.notify_exit(&mut context);
        tracing::debug!(index, code, ?decision, "Command exited");
        self.events.emit(SessionEvent::CommandExit {
            index,
            command: record.command().to_string(),
            code,
        });

        if let Some(stop) = self.take_control_requests() {
            self.queue.retire_through(index);
            return Step::Stop(stop);
        }

        Step::Continue(self.queue.commit(index, decision, context.into_staged()))
    }

    /// Apply pending requests. Returns the first terminal one, if any.
    fn take_control_requests(&mut self) -> Option<Stop> {
        while let Ok(request) = self.control.try_recv() {
            match request {
                ControlRequest::SetBaseDir(dir) => *self.base_dir = dir,
                ControlRequest::End => return Some(Stop::Ended),
                ControlRequest::Reset(on_done) => return Some(Stop::Reset(on_done)),
            }
        }
        None
    }
}
