//! Server-Sent Events (SSE) utilities

use crate::events::{EventBus, WatchdogEvent};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Interval of the keep-alive comment sent on idle SSE connections
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Convert a bus event into an SSE frame
///
/// The SSE `event:` field carries the event type; `data:` carries the JSON
/// body (which repeats the type in its `type` tag).
pub fn to_sse_event(event: &WatchdogEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}

/// Create an SSE stream that relays every EventBus event
///
/// The stream opens with a `ConnectionStatus: connected` frame so dashboards
/// can show connection state before the first alert arrives. A subscriber
/// that falls behind the bus capacity skips the missed events and continues.
pub fn create_event_sse_stream(
    bus: &EventBus,
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = bus.subscribe();
    info!(
        "New SSE client connected to {} events ({} subscribers)",
        service_name,
        bus.subscriber_count()
    );

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    debug!("SSE: Broadcasting {}", event.event_type());
                    if let Some(frame) = to_sse_event(&event) {
                        yield Ok(frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE client lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("SSE: {} event bus closed", service_name);
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("heartbeat"),
    )
}
