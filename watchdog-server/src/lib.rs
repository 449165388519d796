//! watchdog-server library
//!
//! Stream catalog, WebSocket video relay and detection alert engine behind
//! one axum router.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use watchdog_common::events::EventBus;

pub mod alerts;
pub mod api;
pub mod error;
pub mod relay;

use alerts::AlertEngine;
use relay::StreamManager;

/// Events buffered per SSE subscriber before it starts losing the oldest
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Stream catalog
    pub db: SqlitePool,
    /// Running relays and their viewers
    pub relays: StreamManager,
    /// Monitoring sessions
    pub alerts: Arc<AlertEngine>,
    /// Status and alert feed
    pub events: EventBus,
}

impl AppState {
    pub fn new(db: SqlitePool, relays: StreamManager, alerts: AlertEngine, events: EventBus) -> Self {
        Self {
            db,
            relays,
            alerts: Arc::new(alerts),
            events,
        }
    }
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let streams = Router::new()
        .route("/api/streams", get(api::list_streams).post(api::create_stream))
        .route(
            "/api/streams/:id",
            get(api::get_stream).delete(api::delete_stream),
        )
        .route("/api/streams/:id/connect", post(api::connect_stream))
        .route("/api/streams/:id/disconnect", post(api::disconnect_stream))
        .route("/api/relays", get(api::list_relays))
        .route("/ws", get(api::websocket_handler));

    let sessions = Router::new()
        .route("/api/modes", get(api::list_modes))
        .route("/api/sessions", post(api::open_session))
        .route(
            "/api/sessions/:id",
            get(api::get_session).delete(api::close_session),
        )
        .route("/api/sessions/:id/detections", post(api::evaluate_frame))
        .route("/api/sessions/:id/target", put(api::set_target))
        .route("/api/sessions/:id/reset", post(api::reset_session));

    Router::new()
        .merge(streams)
        .merge(sessions)
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
}

/// Router plus dashboard assets, CORS and request tracing
pub fn build_app(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut app = build_router(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
