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

//! Queued command records and their lifecycle handlers.

use std::fmt;

use crate::queue::{ExitContext, ExitDecision};

pub type StartHandler = Box<dyn FnMut() + Send>;
pub type OutputHandler = Box<dyn FnMut(&str) + Send>;
pub type ExitHandler = Box<dyn FnMut(&mut ExitContext) -> ExitDecision + Send>;

/// Options for one queued command.
///
/// Every handler is optional. A missing exit handler continues the queue;
/// missing stderr output is logged.
#[derive(Default)]
pub struct ExecOptions {
    args: Option<Vec<String>>,
    input: Option<Vec<u8>>,
    pty: bool,
    on_start: Option<StartHandler>,
    on_stdout: Option<OutputHandler>,
    on_stderr: Option<OutputHandler>,
    on_exit: Option<ExitHandler>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments appended to the command, separated by single spaces.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.args = Some(args.into_iter().map(|a| a.to_string()).collect());
        self
    }

    /// Payload written to stdin, followed by EOF.
    pub fn input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Allocate a pseudo-terminal. Required for `sudo` prompts on most systems.
    pub fn pty(mut self, pty: bool) -> Self {
        self.pty = pty;
        self
    }

    pub fn on_start(mut self, handler: impl FnMut() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(handler));
        self
    }

    pub fn on_stdout(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_stdout = Some(Box::new(handler));
        self
    }

    pub fn on_stderr(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_stderr = Some(Box::new(handler));
        self
    }

    /// Called with the exit status and the full output. The returned
    /// [`ExitDecision`] drives what runs next.
    pub fn on_exit(
        mut self,
        handler: impl FnMut(&mut ExitContext) -> ExitDecision + Send + 'static,
    ) -> Self {
        self.on_exit = Some(Box::new(handler));
        self
    }
}

/// Build the command text: `command` followed by each argument.
pub fn command_text(command: &str, args: Option<&[String]>) -> String {
    match args {
        Some(args) => {
            let mut text = String::with_capacity(
                command.len() + args.iter().map(|a| a.len() + 1).sum::<usize>(),
            );
            text.push_str(command);
            for arg in args {
                text.push(' ');
                text.push_str(arg);
            }
            text
        }
        None => command.to_string(),
    }
}

/// Prefix `command` with a change into `base_dir` when one is set.
pub fn effective_command(base_dir: Option<&str>, command: &str) -> String {
    match base_dir {
        Some(dir) if !dir.is_empty() => format!("cd {dir} && {command}"),
        _ => command.to_string(),
    }
}

/// One queued unit of work. The command text is fixed at creation.
pub struct CommandRecord {
    command: String,
    input: Option<Vec<u8>>,
    pty: bool,
    on_start: Option<StartHandler>,
    on_stdout: Option<OutputHandler>,
    on_stderr: Option<OutputHandler>,
    on_exit: Option<ExitHandler>,
}

impl CommandRecord {
    pub fn new(command: impl AsRef<str>, options: ExecOptions) -> Self {
        let ExecOptions {
            args,
            input,
            pty,
            on_start,
            on_stdout,
            on_stderr,
            on_exit,
        } = options;

        Self {
            command: command_text(command.as_ref(), args.as_deref()),
            input,
            pty,
            on_start,
            on_stdout,
            on_stderr,
            on_exit,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn input(&self) -> Option<&[u8]> {
        self.input.as_deref()
    }

    pub fn pty(&self) -> bool {
        self.pty
    }

    pub(crate) fn notify_start(&mut self) {
        if let Some(handler) = self.on_start.as_mut() {
            handler();
        }
    }

    pub(crate) fn notify_stdout(&mut self, chunk: &str) {
        if let Some(handler) = self.on_stdout.as_mut() {
            handler(chunk);
        }
    }

    /// Deliver a stderr chunk, logging it when no handler was supplied.
    pub(crate) fn notify_stderr(&mut self, chunk: &str) {
        match self.on_stderr.as_mut() {
            Some(handler) => handler(chunk),
            None => {
                let command = self.command.clone();
                let mut fallback: OutputHandler = Box::new(move |chunk: &str| {
                    tracing::info!(command = %command, "{}", chunk.trim_end());
                });
                fallback(chunk);
                self.on_stderr = Some(fallback);
            }
        }
    }

    pub(crate) fn notify_exit(&mut self, context: &mut ExitContext) -> ExitDecision {
        match self.on_exit.as_mut() {
            Some(handler) => handler(context),
            None => ExitDecision::Continue,
        }
    }
}

impl fmt::Debug for CommandRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRecord")
            .field("command", &self.command)
            .field("input_len", &self.input.as_ref().map(Vec::len))
            .field("pty", &self.pty)
            .finish_non_exhaustive()
    }
}
