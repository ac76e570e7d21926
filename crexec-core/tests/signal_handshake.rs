// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Restore-token handshake over real signals.
//!
//! Signal masks are per thread, so these run without the test harness: the
//! main thread blocks the signal before any helper thread is started and
//! helpers inherit the blocked mask.

use std::thread;
use std::time::{Duration, Instant};

use crexec_core::engine::{queue_token, queue_token_with_signal, restore_signal, SignalTokenChannel};
use crexec_core::{
    Engine, EngineState, OsLauncher, ProcessError, RestoreToken, RestoreTokenChannel,
};

const SEND_DELAY: Duration = Duration::from_millis(200);

fn send_later(signal: libc::c_int, token: i32) -> thread::JoinHandle<()> {
    // SAFETY: getpid has no preconditions.
    let pid = unsafe { libc::getpid() };
    thread::spawn(move || {
        thread::sleep(SEND_DELAY);
        queue_token_with_signal(pid, signal, RestoreToken::new(token)).expect("sigqueue failed");
    })
}

fn checkpoint_receives_queued_token() {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");

    let mut channel = SignalTokenChannel::new();
    channel.arm().expect("Failed to block restore signal");

    // SAFETY: getpid has no preconditions.
    let pid = unsafe { libc::getpid() };
    let started = Instant::now();
    let sender = thread::spawn(move || {
        thread::sleep(SEND_DELAY);
        queue_token(pid, RestoreToken::new(4242)).expect("sigqueue failed");
    });

    let mut engine = Engine::with_backends(Box::new(OsLauncher), Box::new(channel));
    engine.configure("exec_location", "/bin/true").unwrap();
    engine
        .configure("image_location", temp_dir.path().to_str().unwrap())
        .unwrap();

    let token = engine.checkpoint().expect("Checkpoint failed");
    let elapsed = started.elapsed();
    sender.join().unwrap();

    // The engine exits immediately, so only the handshake can account for
    // the wait.
    assert!(elapsed >= SEND_DELAY, "checkpoint returned after {:?}", elapsed);

    assert_eq!(token, RestoreToken::new(4242));
    assert_eq!(engine.restore_token(), Some(token));
    assert_eq!(engine.state(), EngineState::Completed);
}

fn negative_payload_survives() {
    let signal = restore_signal() + 1;
    let mut channel = SignalTokenChannel::with_signal(signal);
    channel.arm().unwrap();
    let sender = send_later(signal, -7);

    let token = channel.wait_token().expect("Handshake failed");
    sender.join().unwrap();
    assert_eq!(token.value(), -7);
}

fn plain_kill_is_rejected() {
    let signal = restore_signal() + 3;
    let mut channel = SignalTokenChannel::with_signal(signal);
    channel.arm().unwrap();

    // SAFETY: getpid has no preconditions.
    let pid = unsafe { libc::getpid() };
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        // SAFETY: the signal is blocked in every thread of this process.
        unsafe { libc::kill(pid, signal) };
    });

    let result = channel.wait_token();
    sender.join().unwrap();
    assert!(matches!(result, Err(ProcessError::Handshake { .. })));
}

fn main() {
    let cases: [(&str, fn()); 3] = [
        ("checkpoint_receives_queued_token", checkpoint_receives_queued_token),
        ("negative_payload_survives", negative_payload_survives),
        ("plain_kill_is_rejected", plain_kill_is_rejected),
    ];

    for (name, case) in cases {
        case();
        println!("test {} ... ok", name);
    }
}
