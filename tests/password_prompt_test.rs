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

//! Interactive password prompts answered from the configured password.

mod common;

use common::{test_config, Captured, FakeRemote};
use sshq::{ExecOptions, ExitDecision, Session, StartOptions};

#[tokio::test]
async fn test_sudo_prompt_is_answered_once() {
    let remote = FakeRemote::new().with_sudo_password("hunter2");
    let mut config = test_config();
    config.password = Some("hunter2".into());
    let mut session = Session::with_connector(config, remote.connector());
    let chunks = Captured::new();
    let exits = Captured::new();

    let sink = chunks.clone();
    let seen = exits.clone();
    session.exec(
        "sudo whoami",
        ExecOptions::new()
            .pty(true)
            .on_stdout(move |chunk| sink.push(chunk.to_string()))
            .on_exit(move |ctx| {
                seen.push((ctx.code(), ctx.stdout().to_string()));
                ExitDecision::Continue
            }),
    );

    session.start(StartOptions::new()).await.unwrap();

    assert_eq!(remote.stdin(), vec![b"hunter2\n".to_vec()]);
    // The prompt itself is consumed, not forwarded.
    assert_eq!(chunks.take(), vec!["ok\n".to_string()]);
    assert_eq!(exits.take(), vec![(0, "ok\n".to_string())]);
}

#[tokio::test]
async fn test_wrong_password_reaches_exit_handler() {
    let remote = FakeRemote::new().with_sudo_password("right");
    let mut config = test_config();
    config.password = Some("wrong".into());
    let mut session = Session::with_connector(config, remote.connector());
    let exits = Captured::new();

    let seen = exits.clone();
    session
        .exec(
            "sudo true",
            ExecOptions::new().on_exit(move |ctx| {
                seen.push((ctx.code(), ctx.stderr().to_string()));
                (ctx.code() == 0).into()
            }),
        )
        .exec("echo unreachable", ExecOptions::new());

    session.start(StartOptions::new()).await.unwrap();

    assert_eq!(exits.take(), vec![(1, "Sorry, try again.\n".to_string())]);
    assert_eq!(remote.commands(), vec!["sudo true"]);
}

#[tokio::test]
async fn test_each_command_gets_its_own_responder() {
    let remote = FakeRemote::new().with_sudo_password("pw");
    let mut config = test_config();
    config.password = Some("pw".into());
    let mut session = Session::with_connector(config, remote.connector());

    session
        .exec("sudo one", ExecOptions::new())
        .exec("sudo two", ExecOptions::new());

    let summary = session.start(StartOptions::new()).await.unwrap();

    assert_eq!(summary.executed, 2);
    assert_eq!(remote.stdin(), vec![b"pw\n".to_vec(), b"pw\n".to_vec()]);
}

#[tokio::test]
async fn test_output_ending_like_a_prompt_triggers_the_secret() {
    // Naive suffix detection: anything ending in ": " looks like a prompt.
    let remote = FakeRemote::new();
    let mut config = test_config();
    config.password = Some("secret".into());
    let mut session = Session::with_connector(config, remote.connector());
    let chunks = Captured::<String>::new();

    let sink = chunks.clone();
    session.exec(
        "prompt Name: ",
        ExecOptions::new().on_stdout(move |chunk| sink.push(chunk.to_string())),
    );

    session.start(StartOptions::new()).await.unwrap();

    assert_eq!(remote.stdin(), vec![b"secret\n".to_vec()]);
    assert!(chunks.take().is_empty());
}

#[tokio::test]
async fn test_without_password_prompt_text_is_forwarded() {
    let remote = FakeRemote::new();
    let mut session = Session::with_connector(test_config(), remote.connector());
    let chunks = Captured::new();

    let sink = chunks.clone();
    session.exec(
        "prompt Name: ",
        ExecOptions::new().on_stdout(move |chunk| sink.push(chunk.to_string())),
    );

    session.start(StartOptions::new()).await.unwrap();

    assert!(remote.stdin().is_empty());
    assert_eq!(chunks.take(), vec!["Name: ".to_string()]);
}

#[tokio::test]
async fn test_next_command_is_watched_again() {
    let remote = FakeRemote::new().with_sudo_password("pw");
    let mut config = test_config();
    config.password = Some("pw".into());
    let mut session = Session::with_connector(config, remote.connector());

    session
        .exec("sudo first", ExecOptions::new())
        .exec("prompt still: ", ExecOptions::new());

    session.start(StartOptions::new()).await.unwrap();

    assert_eq!(remote.stdin().len(), 2);
}
