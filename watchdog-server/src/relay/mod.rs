//! Stream relay
//!
//! Fans one transcoded upstream out to every WebSocket viewer subscribed to
//! it. The transcoder is started by the first viewer and killed when the
//! last one leaves.

pub mod manager;
pub mod messages;
pub mod status;
pub mod transcoder;

pub use manager::{
    generate_stream_id, RelayInfo, RelaySettings, StreamManager, ViewerId, ViewerSender,
    WeakStreamManager,
};
pub use messages::{ClientMessage, ServerMessage};
pub use status::{resync_statuses, spawn_status_recorder};
pub use transcoder::{FfmpegTranscoder, TranscodeOutput, Transcoder};

use thiserror::Error;

/// Relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// The transcoder process could not be started
    #[error("failed to start transcoder for {url}: {reason}")]
    Spawn { url: String, reason: String },

    /// The transcoder started without a readable output pipe
    #[error("transcoder produced no output stream")]
    NoOutput,
}
