//! Stream catalog and relay control API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use watchdog_common::db::{self, NewStream, StreamRecord};
use watchdog_common::events::WatchdogEvent;

use crate::error::{ApiError, ApiResult};
use crate::relay::RelayInfo;
use crate::AppState;

/// Body of POST /api/streams
///
/// Fields are optional so a missing one yields a 400 with a readable message
/// instead of a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreateStreamRequest {
    pub url: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Result of a relay control request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayControlResponse {
    pub stream_id: String,
    pub running: bool,
    /// False when the request found the relay already in the wanted state
    pub changed: bool,
}

/// GET /api/streams
pub async fn list_streams(State(state): State<AppState>) -> ApiResult<Json<Vec<StreamRecord>>> {
    Ok(Json(db::list_streams(&state.db).await?))
}

/// POST /api/streams
pub async fn create_stream(
    State(state): State<AppState>,
    Json(request): Json<CreateStreamRequest>,
) -> ApiResult<(StatusCode, Json<StreamRecord>)> {
    let new_stream = NewStream::parse(
        request.url.as_deref(),
        request.name.as_deref(),
        request.kind.as_deref(),
    )?;
    let record = db::insert_stream(&state.db, &new_stream).await?;

    info!("Registered stream {} ({})", record.id, record.name);
    state.events.emit_lossy(WatchdogEvent::StreamRegistered {
        stream_id: record.id.clone(),
        name: record.name.clone(),
        url: record.url.clone(),
        timestamp: Utc::now(),
    });

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/streams/:id
pub async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StreamRecord>> {
    find_stream(&state, &id).await.map(Json)
}

/// DELETE /api/streams/:id
///
/// Tears down the stream's relay before forgetting the record.
pub async fn delete_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    find_stream(&state, &id).await?;

    state.relays.remove_stream(&id).await;
    if !db::delete_stream(&state.db, &id).await? {
        return Err(not_found(&id));
    }

    info!("Deleted stream {}", id);
    state.events.emit_lossy(WatchdogEvent::StreamRemoved {
        stream_id: id,
        timestamp: Utc::now(),
    });

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/streams/:id/connect
pub async fn connect_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RelayControlResponse>> {
    let record = find_stream(&state, &id).await?;
    let changed = state.relays.connect(&record.id, &record.url).await?;

    Ok(Json(RelayControlResponse {
        stream_id: record.id,
        running: true,
        changed,
    }))
}

/// POST /api/streams/:id/disconnect
pub async fn disconnect_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RelayControlResponse>> {
    let record = find_stream(&state, &id).await?;
    let changed = state.relays.remove_stream(&record.id).await;

    Ok(Json(RelayControlResponse {
        stream_id: record.id,
        running: false,
        changed,
    }))
}

/// GET /api/relays
pub async fn list_relays(State(state): State<AppState>) -> Json<Vec<RelayInfo>> {
    Json(state.relays.relays().await)
}

async fn find_stream(state: &AppState, id: &str) -> ApiResult<StreamRecord> {
    db::get_stream(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))
}

fn not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("stream not found: {}", id))
}
