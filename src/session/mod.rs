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

//! Session lifecycle: connect, run the queue, close, reset.

mod events;
mod handle;
mod runner;
mod state;

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::command::{CommandRecord, ExecOptions};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::queue::CommandQueue;
use crate::transport::{ConnectParams, Connector, RusshConnector, Transport};

pub use events::{EventKind, ListenerId, SessionEvent};
pub use handle::SessionHandle;
pub use state::ConnectionState;

use events::EventBus;
use handle::ControlRequest;
use runner::{QueueRunner, Stop};
use state::transition;

/// One-shot callbacks for [`Session::start`].
#[derive(Default)]
pub struct StartOptions {
    on_success: Option<Box<dyn FnOnce() + Send>>,
    on_fail: Option<Box<dyn FnOnce(&Error) + Send>>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the connection is ready, before the first command runs.
    pub fn on_success(mut self, handler: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(handler));
        self
    }

    /// Called when the connection cannot be established.
    pub fn on_fail(mut self, handler: impl FnOnce(&Error) + Send + 'static) -> Self {
        self.on_fail = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartOptions")
            .field("on_success", &self.on_success.is_some())
            .field("on_fail", &self.on_fail.is_some())
            .finish()
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every queued command ran.
    Completed,
    /// An exit handler stopped the queue.
    Halted,
    /// The channel for the command at `index` could not be opened.
    ChannelOpenFailed { index: usize },
    /// The channel for the command at `index` closed without an exit status.
    ChannelLost { index: usize },
    /// [`SessionHandle::end`] interrupted the run.
    Ended,
    /// [`SessionHandle::reset`] interrupted the run.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Commands whose channel was opened.
    pub executed: usize,
    pub outcome: RunOutcome,
}

/// Runs queued commands one after another over a single SSH connection.
///
/// ```no_run
/// # async fn demo() -> sshq::Result<()> {
/// use sshq::{ExecOptions, ExitDecision, Session, SessionConfig, StartOptions};
///
/// let config = SessionConfig::builder("example.com", "deploy")
///     .password("hunter2")
///     .build();
/// let mut session = Session::new(config);
/// session
///     .exec("git pull", ExecOptions::new().on_exit(|ctx| (ctx.code() == 0).into()))
///     .exec("sudo systemctl restart app", ExecOptions::new().pty(true))
///     .exec("echo", ExecOptions::new().args(["done"]).on_exit(|_| ExitDecision::Continue));
/// let summary = session.start(StartOptions::new()).await?;
/// println!("{} commands ran", summary.executed);
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    queue: CommandQueue,
    state: ConnectionState,
    generation: u64,
    events: EventBus,
    control_tx: mpsc::UnboundedSender<ControlRequest>,
    control_rx: mpsc::UnboundedReceiver<ControlRequest>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, Arc::new(RusshConnector::new()))
    }

    /// Use a custom [`Connector`] instead of russh.
    pub fn with_connector(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Self {
            config,
            connector,
            transport: None,
            queue: CommandQueue::new(),
            state: ConnectionState::Unconnected,
            generation: 0,
            events: EventBus::default(),
            control_tx,
            control_rx,
        }
    }

    /// Queue `command`. With `args`, the text run is `command` followed by the
    /// arguments joined with spaces.
    pub fn exec(&mut self, command: impl AsRef<str>, options: ExecOptions) -> &mut Self {
        self.enqueue(CommandRecord::new(command, options))
    }

    pub fn enqueue(&mut self, record: CommandRecord) -> &mut Self {
        self.apply_idle_requests();
        tracing::trace!(command = %record.command(), "Queued command");
        self.queue.push(record);
        self
    }

    /// Number of records still waiting to run.
    ///
    /// A run that completes or halts empties the queue, so this is 0 after
    /// such a run rather than the number of commands that were enqueued.
    pub fn count(&mut self) -> usize {
        self.apply_idle_requests();
        self.queue.len()
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.queue.commands()
    }

    pub fn state(&self) -> ConnectionState {
        match (&self.state, &self.transport) {
            (ConnectionState::Closing, Some(transport)) if transport.is_closed() => {
                ConnectionState::Closed
            }
            _ => self.state,
        }
    }

    /// Incremented by every reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn on(
        &mut self,
        kind: EventKind,
        listener: impl FnMut(&SessionEvent) + Send + 'static,
    ) -> ListenerId {
        self.events.on(kind, Box::new(listener))
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// A handle for ending or resetting the session from inside callbacks.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.control_tx.clone())
    }

    /// Connect, run every queued command in order, then close the connection.
    ///
    /// Connection failures call `on_fail`, emit [`SessionEvent::Error`], and are
    /// returned. Everything after the connection is ready is reported through
    /// the returned [`RunSummary`].
    pub async fn start(&mut self, options: StartOptions) -> Result<RunSummary> {
        let StartOptions {
            on_success,
            on_fail,
        } = options;

        self.apply_idle_requests();
        self.settle_previous_transport().await;

        transition(&mut self.state, ConnectionState::Connecting);
        let transport = match self.connect().await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", self.config.host, e);
                transition(&mut self.state, ConnectionState::Closed);
                if let Some(on_fail) = on_fail {
                    on_fail(&e);
                }
                self.events.emit(SessionEvent::error(&e));
                return Err(e);
            }
        };
        let transport = self.transport.insert(transport);

        transition(&mut self.state, ConnectionState::Ready);
        tracing::info!(
            "Connected to {}@{}:{}",
            self.config.user,
            self.config.host,
            self.config.port
        );
        self.events.emit(SessionEvent::Ready);
        if let Some(on_success) = on_success {
            on_success();
        }

        let (stop, executed) = if self.queue.is_empty() {
            (Stop::Completed, 0)
        } else {
            let secret = self.config.prompt_secret().cloned();
            let mut runner = QueueRunner {
                queue: &mut self.queue,
                transport: &mut **transport,
                events: &mut self.events,
                control: &mut self.control_rx,
                state: &mut self.state,
                base_dir: &mut self.config.base_dir,
                secret,
                handle: SessionHandle::new(self.control_tx.clone()),
                executed: 0,
            };
            let stop = runner.run(0).await;
            (stop, runner.executed)
        };

        let outcome = match stop {
            Stop::Completed => RunOutcome::Completed,
            Stop::Halted => RunOutcome::Halted,
            Stop::ChannelOpenFailed { index } => RunOutcome::ChannelOpenFailed { index },
            Stop::ChannelLost { index } => RunOutcome::ChannelLost { index },
            Stop::Ended => RunOutcome::Ended,
            Stop::Reset(on_done) => {
                let result = self.reset().await;
                if let Some(on_done) = on_done {
                    on_done(result);
                }
                return Ok(RunSummary {
                    executed,
                    outcome: RunOutcome::Reset,
                });
            }
        };

        self.close_transport().await;
        tracing::debug!(executed, ?outcome, "Run finished");
        Ok(RunSummary { executed, outcome })
    }

    /// Close any live connection and wait for it to terminate, then empty the
    /// queue. Nothing queued before the reset runs afterwards.
    pub async fn reset(&mut self) -> Result<()> {
        let result = self.close_transport().await;
        self.discard_queue();
        result
    }

    fn discard_queue(&mut self) {
        self.queue.clear();
        self.generation += 1;
        transition(&mut self.state, ConnectionState::Closed);
        transition(&mut self.state, ConnectionState::Unconnected);
        tracing::debug!(generation = self.generation, "Session reset");
    }

    /// Ask the server to close the connection without waiting for it to go
    /// away. Does nothing when not connected.
    pub async fn end(&mut self) -> Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };
        if transport.is_closed() {
            return Ok(());
        }
        transition(&mut self.state, ConnectionState::Closing);
        transport.end().await
    }

    async fn connect(&self) -> Result<Box<dyn Transport>> {
        self.config.validate()?;
        let params = ConnectParams::from_config(&self.config);
        tracing::debug!(
            host = %params.host,
            port = params.port,
            method = params.auth.label(),
            "Connecting"
        );

        let connector = Arc::clone(&self.connector);
        let timeout = self.config.timeout;
        match tokio::time::timeout(timeout, async move { connector.connect(&params).await }).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectTimeout(timeout)),
        }
    }

    /// Close the live transport, if any, and wait for it to terminate.
    async fn close_transport(&mut self) -> Result<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };

        let mut result = Ok(());
        if !transport.is_closed() {
            if self.state != ConnectionState::Closing {
                transition(&mut self.state, ConnectionState::Closing);
            }
            result = transport.end().await;
            if let Err(e) = &result {
                tracing::warn!("Error while closing connection: {}", e);
            }
            transport.closed().await;
        }
        transition(&mut self.state, ConnectionState::Closed);
        self.events.emit(SessionEvent::Close);
        result
    }

    /// A transport left behind by [`Session::end`] or a cancelled run.
    async fn settle_previous_transport(&mut self) {
        if self.transport.is_some() {
            tracing::debug!("Closing previous connection before reconnecting");
            let _ = self.close_transport().await;
        }
    }

    /// Apply requests sent while no run was in progress, in the order they
    /// were sent. A reset here only discards what was queued before it.
    fn apply_idle_requests(&mut self) {
        while let Ok(request) = self.control_rx.try_recv() {
            match request {
                ControlRequest::SetBaseDir(dir) => self.config.base_dir = dir,
                ControlRequest::End => tracing::debug!("Ignoring end request sent while idle"),
                ControlRequest::Reset(on_done) => {
                    // Only a connection left behind by `end` or a cancelled
                    // run can still be here. Dropping it tears it down.
                    if self.transport.take().is_some() {
                        tracing::debug!("Dropping previous connection on reset");
                        transition(&mut self.state, ConnectionState::Closed);
                        self.events.emit(SessionEvent::Close);
                    }
                    self.discard_queue();
                    if let Some(on_done) = on_done {
                        on_done(Ok(()));
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .field("generation", &self.generation)
            .finish()
    }
}
