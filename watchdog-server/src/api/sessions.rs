//! Monitoring session API
//!
//! A dashboard opens one session per monitoring view, posts each frame's
//! detections to it and renders the returned overlay rows and alerts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::alerts::{Detection, Evaluation, ModeInfo, MonitorMode, SessionSnapshot};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionRequest {
    pub mode: Option<String>,
    /// Class to watch for in CCTV mode (default "person")
    pub target: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetectionFrame {
    pub detections: Vec<Detection>,
}

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub target: String,
}

/// GET /api/modes
pub async fn list_modes(State(state): State<AppState>) -> Json<Vec<ModeInfo>> {
    Json(state.alerts.list_modes())
}

/// POST /api/sessions
pub async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionSnapshot>)> {
    let mode = request
        .mode
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("mode is required".to_string()))?
        .parse::<MonitorMode>()?;

    let snapshot = state
        .alerts
        .open_session(mode, request.target.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.alerts.session(id).await?))
}

/// DELETE /api/sessions/:id
pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.alerts.close_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/:id/detections
pub async fn evaluate_frame(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(frame): Json<DetectionFrame>,
) -> ApiResult<Json<Evaluation>> {
    Ok(Json(state.alerts.evaluate(id, &frame.detections).await?))
}

/// PUT /api/sessions/:id/target
pub async fn set_target(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TargetRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.alerts.set_target(id, &request.target).await?))
}

/// POST /api/sessions/:id/reset
pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.alerts.reset_session(id).await?))
}
