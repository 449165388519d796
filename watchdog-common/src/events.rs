//! Event types for the Watchdog event system
//!
//! Provides the shared event definitions and the EventBus that carries relay
//! status changes, catalog changes and fired alerts to SSE subscribers and
//! the catalog status recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Watchdog event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WatchdogEvent {
    /// A stream source was added to the catalog
    StreamRegistered {
        stream_id: String,
        name: String,
        url: String,
        timestamp: DateTime<Utc>,
    },

    /// A stream source was deleted from the catalog
    StreamRemoved {
        stream_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A transcoder was started for a stream
    ///
    /// Triggers:
    /// - Catalog: status `active`, `last_active` stamped
    /// - SSE: dashboards show the stream as live
    RelayStarted {
        stream_id: String,
        url: String,
        timestamp: DateTime<Utc>,
    },

    /// A relay was torn down on purpose or its upstream ended
    ///
    /// Triggers:
    /// - Catalog: status `inactive`
    RelayStopped {
        stream_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The transcoder failed (spawn error, read error, non-zero exit)
    ///
    /// Triggers:
    /// - Catalog: status `error`
    RelayFailed {
        stream_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Number of viewers attached to a relay changed
    ViewerCountChanged {
        stream_id: String,
        viewers: usize,
        timestamp: DateTime<Utc>,
    },

    /// A dashboard opened a monitoring session
    SessionOpened {
        session_id: Uuid,
        mode: String,
        timestamp: DateTime<Utc>,
    },

    /// A monitoring session was closed
    SessionClosed {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A trigger policy fired for a detection frame
    ///
    /// `alarm` is false when the session's alarm interval suppressed the
    /// audible signal; the visual/push alert is still delivered.
    AlertRaised {
        session_id: Uuid,
        mode: String,
        title: String,
        message: String,
        label: String,
        confidence: u8,
        alarm: bool,
        timestamp: DateTime<Utc>,
    },
}

impl WatchdogEvent {
    /// SSE `event:` field for this event
    pub fn event_type(&self) -> &'static str {
        match self {
            WatchdogEvent::StreamRegistered { .. } => "StreamRegistered",
            WatchdogEvent::StreamRemoved { .. } => "StreamRemoved",
            WatchdogEvent::RelayStarted { .. } => "RelayStarted",
            WatchdogEvent::RelayStopped { .. } => "RelayStopped",
            WatchdogEvent::RelayFailed { .. } => "RelayFailed",
            WatchdogEvent::ViewerCountChanged { .. } => "ViewerCountChanged",
            WatchdogEvent::SessionOpened { .. } => "SessionOpened",
            WatchdogEvent::SessionClosed { .. } => "SessionClosed",
            WatchdogEvent::AlertRaised { .. } => "AlertRaised",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for application-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use watchdog_common::events::{EventBus, WatchdogEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(WatchdogEvent::StreamRemoved {
///     stream_id: "lobby".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WatchdogEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers
    ///   start losing the oldest ones
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<WatchdogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: WatchdogEvent,
    ) -> Result<usize, broadcast::error::SendError<WatchdogEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: WatchdogEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
