//! Test helpers for watchdog-server integration tests
//!
//! - FakeTranscoder: in-memory transcoder whose output the test writes
//! - recv_message / next_event: bounded waits on channels

#![allow(dead_code)]

pub mod fake_transcoder;

pub use fake_transcoder::{FakeTranscoder, BROKEN_PREFIX, BROKEN_SCHEME, FAIL_SCHEME};

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use watchdog_common::events::WatchdogEvent;
use watchdog_server::relay::ServerMessage;

pub const WAIT: Duration = Duration::from_secs(2);

/// Next message queued for a viewer, failing the test after [`WAIT`]
pub async fn recv_message(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for viewer message")
        .expect("viewer queue closed")
}

/// Next event matching `pred`, skipping others
pub async fn next_event(
    rx: &mut broadcast::Receiver<WatchdogEvent>,
    pred: impl Fn(&WatchdogEvent) -> bool,
) -> WatchdogEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `check` until it holds or [`WAIT`] elapses
pub async fn eventually<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
