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

//! In-memory transport that behaves like a tiny remote shell.
//!
//! Understood commands (optionally prefixed with `cd DIR && `):
//! - `echo ARGS...`: prints ARGS and a newline, exits 0
//! - `exit N`: exits N
//! - `cat`: echoes stdin as it arrives, exits 0 once input is closed
//! - `pwd`: prints the directory from the `cd` prefix, or `/home/<user>`
//! - `err TEXT`: prints TEXT to stderr, exits 1
//! - `prompt TEXT`: prints TEXT with no newline, exits 0
//! - `exit-first TEXT`: sends the exit status before printing TEXT
//! - `sudo ...`: asks for a password and checks it against the remote's
//! - `hang`: never finishes
//! - `lost`: closes the channel without an exit status
//! - `signal N`: killed by signal N, reported as exit code 128 + N
//!
//! Any command containing `FAIL_OPEN` is refused at channel open.
//!
//! Stdin is a pipe holding at most `STDIN_WINDOW` unread bytes. A writer
//! blocks until the command consumes its input, like a flow-controlled SSH
//! channel.

#![allow(dead_code)]

use async_trait::async_trait;
use sshq::transport::{
    ChannelEvent, ChannelOptions, ConnectParams, Connector, InputWriter, RemoteChannel, Transport,
};
use sshq::{Error, Result, SessionConfig};
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::Notify;

pub const SUDO_PROMPT: &str = "[sudo] password for tester: ";
pub const FAIL_OPEN: &str = "FAIL_OPEN";
pub const STDIN_WINDOW: usize = 8 * 1024;

/// What the fake server does when a client connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    RejectPassword,
    Hang,
}

/// Everything the fake remote observed.
#[derive(Debug, Default)]
pub struct RemoteLog {
    pub commands: Vec<String>,
    pub pty: Vec<bool>,
    pub stdin: Vec<Vec<u8>>,
    pub connects: usize,
    pub disconnects: usize,
    pub auth_methods: Vec<String>,
}

#[derive(Clone)]
pub struct FakeRemote {
    behavior: ConnectBehavior,
    sudo_password: Option<String>,
    log: Arc<Mutex<RemoteLog>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            behavior: ConnectBehavior::Accept,
            sudo_password: None,
            log: Arc::new(Mutex::new(RemoteLog::default())),
        }
    }

    pub fn with_behavior(mut self, behavior: ConnectBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_sudo_password(mut self, password: &str) -> Self {
        self.sudo_password = Some(password.to_string());
        self
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().commands.clone()
    }

    pub fn stdin(&self) -> Vec<Vec<u8>> {
        self.log.lock().unwrap().stdin.clone()
    }

    pub fn pty(&self) -> Vec<bool> {
        self.log.lock().unwrap().pty.clone()
    }

    pub fn connects(&self) -> usize {
        self.log.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.log.lock().unwrap().disconnects
    }

    pub fn auth_methods(&self) -> Vec<String> {
        self.log.lock().unwrap().auth_methods.clone()
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig::builder("fake.example.com", "tester")
        .timeout(Duration::from_secs(2))
        .build()
}

#[async_trait]
impl Connector for FakeRemote {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Transport>> {
        {
            let mut log = self.log.lock().unwrap();
            log.connects += 1;
            log.auth_methods.push(params.auth.label().to_string());
        }

        match self.behavior {
            ConnectBehavior::Accept => Ok(Box::new(FakeTransport {
                remote: self.clone(),
                user: params.user.clone(),
                closed: false,
            })),
            ConnectBehavior::RejectPassword => Err(Error::PasswordWrong),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }
}

struct FakeTransport {
    remote: FakeRemote,
    user: String,
    closed: bool,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_channel(
        &mut self,
        command: &str,
        options: ChannelOptions,
    ) -> Result<Box<dyn RemoteChannel>> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if command.contains(FAIL_OPEN) {
            return Err(Error::ChannelOpen {
                command: command.to_string(),
                reason: "administratively prohibited".to_string(),
            });
        }

        {
            let mut log = self.remote.log.lock().unwrap();
            log.commands.push(command.to_string());
            log.pty.push(options.pty);
        }

        Ok(Box::new(FakeChannel::spawn(
            command,
            &self.user,
            self.remote.clone(),
        )))
    }

    async fn end(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.remote.log.lock().unwrap().disconnects += 1;
        }
        Ok(())
    }

    async fn closed(&mut self) {}

    fn is_closed(&self) -> bool {
        self.closed
    }
}

enum Waiting {
    Nothing,
    Stdin,
    Password,
    Forever,
}

/// The remote end of a channel's stdin.
#[derive(Default)]
struct StdinPipe {
    buffer: Vec<u8>,
    eof: bool,
    blocked_writer: Option<Waker>,
}

struct FakeChannel {
    events: VecDeque<ChannelEvent>,
    waiting: Waiting,
    pipe: Arc<Mutex<StdinPipe>>,
    readable: Arc<Notify>,
    remote: FakeRemote,
}

impl FakeChannel {
    fn spawn(command: &str, user: &str, remote: FakeRemote) -> Self {
        let (cwd, command) = match command.strip_prefix("cd ") {
            Some(rest) => match rest.split_once(" && ") {
                Some((dir, command)) => (dir.to_string(), command.to_string()),
                None => (rest.to_string(), String::new()),
            },
            None => (format!("/home/{user}"), command.to_string()),
        };

        let mut channel = FakeChannel {
            events: VecDeque::new(),
            waiting: Waiting::Nothing,
            pipe: Arc::new(Mutex::new(StdinPipe::default())),
            readable: Arc::new(Notify::new()),
            remote,
        };

        let (program, rest) = command.split_once(' ').unwrap_or((command.as_str(), ""));
        match program {
            "echo" => channel.stdout(format!("{rest}\n")).exit(0),
            "exit" => channel.exit(rest.trim().parse().unwrap_or(255)),
            "pwd" => channel.stdout(format!("{cwd}\n")).exit(0),
            "err" => channel.stderr(format!("{rest}\n")).exit(1),
            "prompt" => channel.stdout(rest.to_string()).exit(0),
            "exit-first" => channel.exit(0).stdout(format!("{rest}\n")),
            "signal" => channel.exit(128 + rest.trim().parse::<u32>().unwrap_or(15)),
            "cat" => {
                channel.waiting = Waiting::Stdin;
                &mut channel
            }
            "sudo" => {
                channel.stdout(SUDO_PROMPT.to_string());
                channel.waiting = Waiting::Password;
                &mut channel
            }
            "hang" => {
                channel.waiting = Waiting::Forever;
                &mut channel
            }
            "lost" => channel.stdout("partial".to_string()),
            _ => channel
                .stderr(format!("sh: {program}: command not found\n"))
                .exit(127),
        };
        channel
    }

    fn stdout(&mut self, text: String) -> &mut Self {
        self.events.push_back(ChannelEvent::Stdout(text.into_bytes()));
        self
    }

    fn stderr(&mut self, text: String) -> &mut Self {
        self.events.push_back(ChannelEvent::Stderr(text.into_bytes()));
        self
    }

    fn exit(&mut self, code: u32) -> &mut Self {
        self.events.push_back(ChannelEvent::Exit(code));
        self
    }

    /// Move a waiting command forward. False while it is still blocked.
    fn advance(&mut self) -> bool {
        match self.waiting {
            Waiting::Nothing => true,
            Waiting::Stdin => {
                let (data, eof) = self.drain_stdin();
                let progressed = !data.is_empty() || eof;
                if !data.is_empty() {
                    self.events.push_back(ChannelEvent::Stdout(data));
                }
                if eof {
                    self.waiting = Waiting::Nothing;
                    self.exit(0);
                }
                progressed
            }
            Waiting::Password => {
                let answered = self.check_password();
                if answered {
                    self.waiting = Waiting::Nothing;
                }
                answered
            }
            Waiting::Forever => false,
        }
    }

    fn drain_stdin(&self) -> (Vec<u8>, bool) {
        let mut pipe = self.pipe.lock().unwrap();
        let data = std::mem::take(&mut pipe.buffer);
        if let Some(writer) = pipe.blocked_writer.take() {
            writer.wake();
        }
        (data, pipe.eof)
    }

    fn check_password(&mut self) -> bool {
        let line = {
            let mut pipe = self.pipe.lock().unwrap();
            let Some(newline) = pipe.buffer.iter().position(|b| *b == b'\n') else {
                return false;
            };
            let line = String::from_utf8_lossy(&pipe.buffer[..newline]).into_owned();
            pipe.buffer.drain(..=newline);
            line
        };
        if Some(line.as_str()) == self.remote.sudo_password.as_deref() {
            self.stdout("ok\n".to_string()).exit(0);
        } else {
            self.stderr("Sorry, try again.\n".to_string()).exit(1);
        }
        true
    }
}

#[async_trait]
impl RemoteChannel for FakeChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if matches!(self.waiting, Waiting::Nothing) {
                return None;
            }
            if !self.advance() {
                self.readable.notified().await;
            }
        }
    }

    fn input_writer(&mut self) -> InputWriter {
        Box::new(FakeInput {
            pipe: Arc::clone(&self.pipe),
            readable: Arc::clone(&self.readable),
            remote: self.remote.clone(),
        })
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        {
            let mut pipe = self.pipe.lock().unwrap();
            if pipe.eof {
                return Err(Error::ChannelWrite("input already closed".to_string()));
            }
            pipe.buffer.extend_from_slice(data);
        }
        self.remote.log.lock().unwrap().stdin.push(data.to_vec());
        self.readable.notify_one();
        Ok(())
    }

    async fn close_input(&mut self) -> Result<()> {
        self.pipe.lock().unwrap().eof = true;
        self.readable.notify_one();
        Ok(())
    }
}

/// Stdin writer that blocks while the pipe is full.
struct FakeInput {
    pipe: Arc<Mutex<StdinPipe>>,
    readable: Arc<Notify>,
    remote: FakeRemote,
}

impl AsyncWrite for FakeInput {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let accepted = {
            let mut pipe = self.pipe.lock().unwrap();
            if pipe.eof {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "input already closed",
                )));
            }
            let room = STDIN_WINDOW.saturating_sub(pipe.buffer.len());
            if room == 0 {
                pipe.blocked_writer = Some(cx.waker().clone());
                return Poll::Pending;
            }
            let accepted = room.min(data.len());
            pipe.buffer.extend_from_slice(&data[..accepted]);
            accepted
        };
        self.remote
            .log
            .lock()
            .unwrap()
            .stdin
            .push(data[..accepted].to_vec());
        self.readable.notify_one();
        Poll::Ready(Ok(accepted))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Shared sink for values captured inside `'static` handlers.
#[derive(Clone)]
pub struct Captured<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Captured<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, value: T) {
        self.0.lock().unwrap().push(value);
    }

    pub fn take(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }
}
