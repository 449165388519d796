//! HTTP API handlers for watchdog-server

pub mod health;
pub mod sessions;
pub mod sse;
pub mod streams;
pub mod ws;

pub use health::health_routes;
pub use sessions::{
    close_session, evaluate_frame, get_session, list_modes, open_session, reset_session,
    set_target,
};
pub use sse::event_stream;
pub use streams::{
    connect_stream, create_stream, delete_stream, disconnect_stream, get_stream, list_relays,
    list_streams,
};
pub use ws::websocket_handler;
