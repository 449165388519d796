//! Integration tests for the StreamManager relay
//!
//! Tests cover:
//! - Fan-out of base64 chunks to every viewer
//! - Transcoder lifetime tied to viewer count
//! - Slow and vanished viewers
//! - Spawn failure, read errors and upstream EOF

mod helpers;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use watchdog_common::events::{EventBus, WatchdogEvent};
use watchdog_server::relay::{RelayError, RelaySettings, ServerMessage, StreamManager};

use helpers::{
    eventually, next_event, recv_message, FakeTranscoder, BROKEN_PREFIX, BROKEN_SCHEME, FAIL_SCHEME,
};

fn setup(queue: usize) -> (StreamManager, FakeTranscoder, EventBus) {
    let transcoder = FakeTranscoder::new();
    let events = EventBus::new(64);
    let manager = StreamManager::new(
        Arc::new(transcoder.clone()),
        events.clone(),
        RelaySettings {
            viewer_queue_capacity: queue,
            chunk_size: 1024,
        },
    );
    (manager, transcoder, events)
}

fn chunk(stream_id: &str, bytes: &[u8]) -> ServerMessage {
    ServerMessage::StreamData {
        stream_id: stream_id.to_string(),
        data: STANDARD.encode(bytes),
    }
}

#[tokio::test]
async fn test_first_viewer_starts_one_transcoder_for_all() {
    let (manager, transcoder, _events) = setup(8);
    let (tx_a, mut rx_a) = manager.viewer_channel();
    let (tx_b, mut rx_b) = manager.viewer_channel();

    let url = "rtsp://cam/lobby";
    assert_eq!(manager.add_viewer("lobby", url, Uuid::new_v4(), tx_a).await.unwrap(), 1);
    assert_eq!(manager.add_viewer("lobby", url, Uuid::new_v4(), tx_b).await.unwrap(), 2);
    assert_eq!(transcoder.spawn_count(), 1);

    let mut feed = transcoder.take_feed(url).unwrap();
    feed.write_all(b"hello").await.unwrap();

    assert_eq!(recv_message(&mut rx_a).await, chunk("lobby", b"hello"));
    assert_eq!(recv_message(&mut rx_b).await, chunk("lobby", b"hello"));

    let relays = manager.relays().await;
    assert_eq!(relays.len(), 1);
    assert_eq!(relays[0].viewers, 2);
    assert_eq!(relays[0].chunks_relayed, 1);
}

#[tokio::test]
async fn test_last_viewer_leaving_kills_transcoder() {
    let (manager, transcoder, events) = setup(8);
    let mut bus = events.subscribe();
    let (tx_a, _rx_a) = manager.viewer_channel();
    let (tx_b, _rx_b) = manager.viewer_channel();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let url = "rtsp://cam/gate";
    manager.add_viewer("gate", url, a, tx_a).await.unwrap();
    manager.add_viewer("gate", url, b, tx_b).await.unwrap();
    let mut feed = transcoder.take_feed(url).unwrap();

    assert!(manager.remove_viewer_from("gate", a).await);
    assert!(manager.is_running("gate").await);
    assert!(!manager.remove_viewer_from("gate", a).await);

    assert!(manager.remove_viewer_from("gate", b).await);
    assert!(!manager.is_running("gate").await);

    let stopped = next_event(&mut bus, |e| matches!(e, WatchdogEvent::RelayStopped { .. })).await;
    match stopped {
        WatchdogEvent::RelayStopped { stream_id, reason, .. } => {
            assert_eq!(stream_id, "gate");
            assert_eq!(reason, "no viewers");
        }
        other => panic!("unexpected event {:?}", other),
    }

    // The pump task is aborted, so its read end goes away
    let mut broken = false;
    for _ in 0..200 {
        if feed.write_all(b"x").await.is_err() {
            broken = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(broken, "transcoder output still open after teardown");
}

#[tokio::test]
async fn test_socket_close_only_stops_streams_it_emptied() {
    let (manager, _transcoder, _events) = setup(8);
    let viewer = Uuid::new_v4();
    let other = Uuid::new_v4();
    let (tx, _rx) = manager.viewer_channel();
    let (other_tx, _other_rx) = manager.viewer_channel();

    manager.add_viewer("one", "rtsp://cam/1", viewer, tx.clone()).await.unwrap();
    manager.add_viewer("two", "rtsp://cam/2", viewer, tx).await.unwrap();
    manager.add_viewer("two", "rtsp://cam/2", other, other_tx).await.unwrap();
    manager.connect("idle", "rtsp://cam/3").await.unwrap();

    let stopped = manager.remove_viewer(viewer).await;
    assert_eq!(stopped, vec!["one".to_string()]);

    assert!(!manager.is_running("one").await);
    assert_eq!(manager.viewer_count("two").await, 1);
    // A relay started without viewers is not collateral
    assert!(manager.is_running("idle").await);
}

#[tokio::test]
async fn test_slow_viewer_does_not_block_others() {
    let (manager, transcoder, _events) = setup(1);
    let (slow_tx, mut slow_rx) = manager.viewer_channel();
    let (fast_tx, mut fast_rx) = manager.viewer_channel();

    let url = "rtsp://cam/hall";
    manager.add_viewer("hall", url, Uuid::new_v4(), slow_tx).await.unwrap();
    manager.add_viewer("hall", url, Uuid::new_v4(), fast_tx).await.unwrap();
    let mut feed = transcoder.take_feed(url).unwrap();

    feed.write_all(b"one").await.unwrap();
    assert_eq!(recv_message(&mut fast_rx).await, chunk("hall", b"one"));
    feed.write_all(b"two").await.unwrap();
    assert_eq!(recv_message(&mut fast_rx).await, chunk("hall", b"two"));

    // The slow viewer kept the first chunk and lost the second
    assert_eq!(slow_rx.try_recv().unwrap(), chunk("hall", b"one"));
    assert!(slow_rx.try_recv().is_err());
    assert_eq!(manager.viewer_count("hall").await, 2);
}

#[tokio::test]
async fn test_vanished_viewers_abandon_the_relay() {
    let (manager, transcoder, events) = setup(8);
    let mut bus = events.subscribe();
    let (tx, rx) = manager.viewer_channel();

    let url = "rtsp://cam/yard";
    manager.add_viewer("yard", url, Uuid::new_v4(), tx).await.unwrap();
    let mut feed = transcoder.take_feed(url).unwrap();
    drop(rx);

    feed.write_all(b"frame").await.unwrap();

    let stopped = next_event(&mut bus, |e| matches!(e, WatchdogEvent::RelayStopped { .. })).await;
    assert!(matches!(stopped, WatchdogEvent::RelayStopped { ref reason, .. } if reason == "no viewers"));
    assert!(eventually(|| async { !manager.is_running("yard").await }).await);
}

#[tokio::test]
async fn test_upstream_eof_notifies_viewers() {
    let (manager, transcoder, events) = setup(8);
    let mut bus = events.subscribe();
    let (tx, mut rx) = manager.viewer_channel();

    let url = "rtsp://cam/dock";
    manager.add_viewer("dock", url, Uuid::new_v4(), tx).await.unwrap();
    let feed = transcoder.take_feed(url).unwrap();
    drop(feed);

    assert_eq!(
        recv_message(&mut rx).await,
        ServerMessage::StreamError {
            stream_id: "dock".to_string(),
            message: "stream ended".to_string(),
        }
    );

    let stopped = next_event(&mut bus, |e| matches!(e, WatchdogEvent::RelayStopped { .. })).await;
    assert!(matches!(stopped, WatchdogEvent::RelayStopped { ref reason, .. } if reason == "upstream ended"));
    assert!(!manager.is_running("dock").await);
}

#[tokio::test]
async fn test_read_error_fails_the_relay() {
    let (manager, _transcoder, events) = setup(8);
    let mut bus = events.subscribe();
    let (tx, mut rx) = manager.viewer_channel();

    let url = format!("{}cam/flaky", BROKEN_SCHEME);
    manager.add_viewer("flaky", &url, Uuid::new_v4(), tx).await.unwrap();

    // Output read before the error is still delivered
    assert_eq!(recv_message(&mut rx).await, chunk("flaky", BROKEN_PREFIX));
    match recv_message(&mut rx).await {
        ServerMessage::StreamError { stream_id, message } => {
            assert_eq!(stream_id, "flaky");
            assert!(message.contains("transcoder read error"), "{}", message);
            assert!(message.contains("connection reset by camera"), "{}", message);
        }
        other => panic!("unexpected message {:?}", other),
    }

    let failed = next_event(&mut bus, |e| matches!(e, WatchdogEvent::RelayFailed { .. })).await;
    assert!(matches!(failed, WatchdogEvent::RelayFailed { ref stream_id, .. } if stream_id == "flaky"));
    assert!(!manager.is_running("flaky").await);
}

#[tokio::test]
async fn test_spawn_failure_leaves_nothing_running() {
    let (manager, _transcoder, events) = setup(8);
    let mut bus = events.subscribe();
    let (tx, _rx) = manager.viewer_channel();

    let url = format!("{}cam/missing", FAIL_SCHEME);
    let err = manager
        .add_viewer("missing", &url, Uuid::new_v4(), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Spawn { .. }));
    assert!(!manager.is_running("missing").await);
    assert!(manager.relays().await.is_empty());

    let failed = next_event(&mut bus, |e| matches!(e, WatchdogEvent::RelayFailed { .. })).await;
    match failed {
        WatchdogEvent::RelayFailed { stream_id, error, .. } => {
            assert_eq!(stream_id, "missing");
            assert!(error.contains("failed to start transcoder"), "{}", error);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(bus.try_recv().is_err());
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (manager, transcoder, events) = setup(8);
    let mut bus = events.subscribe();

    assert!(manager.connect("gate", "rtsp://cam/gate").await.unwrap());
    assert!(!manager.connect("gate", "rtsp://cam/gate").await.unwrap());
    assert_eq!(transcoder.spawn_count(), 1);

    let started = next_event(&mut bus, |e| matches!(e, WatchdogEvent::RelayStarted { .. })).await;
    assert!(matches!(started, WatchdogEvent::RelayStarted { ref stream_id, .. } if stream_id == "gate"));

    // Output with nobody watching is consumed and counted
    let mut feed = transcoder.take_feed("rtsp://cam/gate").unwrap();
    feed.write_all(b"idle").await.unwrap();
    assert!(
        eventually(|| async {
            manager.relays().await.first().map(|r| r.chunks_relayed) == Some(1)
        })
        .await
    );

    assert!(manager.remove_stream("gate").await);
    assert!(!manager.remove_stream("gate").await);
}

#[tokio::test]
async fn test_shutdown_notifies_viewers() {
    let (manager, _transcoder, _events) = setup(8);
    let (tx, mut rx) = manager.viewer_channel();
    manager
        .add_viewer("lobby", "rtsp://cam/lobby", Uuid::new_v4(), tx)
        .await
        .unwrap();

    manager.shutdown().await;

    assert!(manager.relays().await.is_empty());
    assert_eq!(
        recv_message(&mut rx).await,
        ServerMessage::StreamError {
            stream_id: "lobby".to_string(),
            message: "server shutdown".to_string(),
        }
    );
}
