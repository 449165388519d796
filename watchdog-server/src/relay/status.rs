//! Catalog status recorder
//!
//! Mirrors relay lifecycle events into the `streams.status` column so the
//! catalog API reports which registered streams are live.

use super::manager::{StreamManager, WeakStreamManager};
use sqlx::SqlitePool;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use watchdog_common::db::{reset_active_streams, set_stream_status, StreamStatus};
use watchdog_common::events::{EventBus, WatchdogEvent};

/// Catalog status implied by a relay event, if any
pub fn status_for(event: &WatchdogEvent) -> Option<(&str, StreamStatus)> {
    match event {
        WatchdogEvent::RelayStarted { stream_id, .. } => Some((stream_id, StreamStatus::Active)),
        WatchdogEvent::RelayStopped { stream_id, .. } => Some((stream_id, StreamStatus::Inactive)),
        WatchdogEvent::RelayFailed { stream_id, .. } => Some((stream_id, StreamStatus::Error)),
        _ => None,
    }
}

/// Rebuild the `active` statuses from the relays that are running now
///
/// Active rows without a relay become inactive; running catalog streams
/// become active. `error` rows with no relay are left alone.
pub async fn resync_statuses(
    pool: &SqlitePool,
    relays: &StreamManager,
) -> watchdog_common::Result<()> {
    let cleared = reset_active_streams(pool).await?;
    let mut marked = 0;
    for stream_id in relays.running_ids().await {
        if set_stream_status(pool, &stream_id, StreamStatus::Active).await? {
            marked += 1;
        }
    }
    info!(
        "Resynced stream statuses ({} cleared, {} running)",
        cleared, marked
    );
    Ok(())
}

/// Subscribe to the bus and persist relay status changes
///
/// The subscription is taken before the task is spawned so no event emitted
/// after this call is missed. When the subscription lags, statuses are
/// rebuilt from `relays`, which is held weakly so the bus still closes once
/// the manager is dropped.
pub fn spawn_status_recorder(
    pool: SqlitePool,
    events: &EventBus,
    relays: &StreamManager,
) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    let relays: WeakStreamManager = relays.downgrade();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some((stream_id, status)) = status_for(&event) else {
                        continue;
                    };
                    match set_stream_status(&pool, stream_id, status).await {
                        Ok(true) => debug!("Stream {} is now {}", stream_id, status),
                        // Ad-hoc relays have no catalog row
                        Ok(false) => {}
                        Err(e) => warn!("Failed to record status of {}: {}", stream_id, e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Status recorder lagged, skipped {} events", skipped);
                    let Some(manager) = relays.upgrade() else {
                        continue;
                    };
                    if let Err(e) = resync_statuses(&pool, &manager).await {
                        warn!("Failed to resync stream statuses: {}", e);
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
