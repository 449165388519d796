//! Server-Sent Events feed of relay status changes and fired alerts

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /api/events
///
/// Streams every `WatchdogEvent`, named by its variant:
/// - AlertRaised (push notification + optional alarm)
/// - RelayStarted / RelayStopped / RelayFailed / ViewerCountChanged
/// - StreamRegistered / StreamRemoved
/// - SessionOpened / SessionClosed
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    watchdog_common::sse::create_event_sse_stream(&state.events, "watchdog-server")
}
