//! Detection alert engine
//!
//! Dashboards run the object-detection model locally and post each frame's
//! predictions to a monitoring session. The session's mode decides which
//! detections fire an alert; fired alerts go out on the event bus.

pub mod detection;
pub mod engine;
pub mod modes;
pub mod session;

pub use detection::{overlay_color, Detection, DetectionSummary};
pub use engine::{AlertEngine, MAX_DETECTIONS_PER_FRAME};
pub use modes::{DetectorOptions, ModeInfo, MonitorMode, Trigger};
pub use session::{Alert, AlertSettings, Evaluation, Session, SessionSnapshot};

use thiserror::Error;
use uuid::Uuid;

/// Alert engine errors
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("invalid detection: {0}")]
    InvalidDetection(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("{0} mode does not take a target object")]
    TargetNotSupported(MonitorMode),

    #[error("unknown monitoring mode: {0}")]
    UnknownMode(String),
}
