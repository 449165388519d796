//! Session registry and alert publication

use super::detection::Detection;
use super::modes::{ModeInfo, MonitorMode};
use super::session::{AlertSettings, Evaluation, Session, SessionSnapshot};
use super::AlertError;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;
use watchdog_common::events::{EventBus, WatchdogEvent};

/// Upper bound on detections accepted in one frame
pub const MAX_DETECTIONS_PER_FRAME: usize = 100;

pub struct AlertEngine {
    sessions: RwLock<HashMap<Uuid, Session>>,
    events: EventBus,
    settings: AlertSettings,
}

impl AlertEngine {
    pub fn new(events: EventBus, settings: AlertSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            events,
            settings,
        }
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    pub fn list_modes(&self) -> Vec<ModeInfo> {
        MonitorMode::ALL.iter().map(MonitorMode::info).collect()
    }

    pub async fn open_session(
        &self,
        mode: MonitorMode,
        target: Option<&str>,
    ) -> Result<SessionSnapshot, AlertError> {
        let id = Uuid::new_v4();
        let session = Session::new(id, mode, target)?;
        let snapshot = session.snapshot();
        self.sessions.write().await.insert(id, session);

        info!("Opened {} session {}", mode, id);
        self.events.emit_lossy(WatchdogEvent::SessionOpened {
            session_id: id,
            mode: mode.to_string(),
            timestamp: Utc::now(),
        });
        Ok(snapshot)
    }

    /// Evaluate one detection frame and publish any alerts it fires
    pub async fn evaluate(
        &self,
        id: Uuid,
        detections: &[Detection],
    ) -> Result<Evaluation, AlertError> {
        if detections.len() > MAX_DETECTIONS_PER_FRAME {
            return Err(AlertError::InvalidDetection(format!(
                "at most {} detections per frame, got {}",
                MAX_DETECTIONS_PER_FRAME,
                detections.len()
            )));
        }
        for detection in detections {
            detection.validate()?;
        }

        let (mode, evaluation) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&id)
                .ok_or(AlertError::SessionNotFound(id))?;
            let evaluation = session.evaluate(detections, Instant::now(), &self.settings);
            (session.mode(), evaluation)
        };

        for alert in &evaluation.alerts {
            debug!("Session {} alert: {}", id, alert.message);
            self.events.emit_lossy(WatchdogEvent::AlertRaised {
                session_id: id,
                mode: mode.to_string(),
                title: alert.title.clone(),
                message: alert.message.clone(),
                label: alert.label.clone(),
                confidence: alert.confidence,
                alarm: alert.alarm,
                timestamp: alert.timestamp,
            });
        }

        Ok(evaluation)
    }

    pub async fn session(&self, id: Uuid) -> Result<SessionSnapshot, AlertError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(Session::snapshot)
            .ok_or(AlertError::SessionNotFound(id))
    }

    pub async fn set_target(&self, id: Uuid, target: &str) -> Result<SessionSnapshot, AlertError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(AlertError::SessionNotFound(id))?;
        session.set_target(target)?;
        debug!("Session {} now watches for '{}'", id, session.target());
        Ok(session.snapshot())
    }

    pub async fn reset_session(&self, id: Uuid) -> Result<SessionSnapshot, AlertError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(AlertError::SessionNotFound(id))?;
        session.reset();
        Ok(session.snapshot())
    }

    pub async fn close_session(&self, id: Uuid) -> Result<(), AlertError> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_none() {
            return Err(AlertError::SessionNotFound(id));
        }

        info!("Closed session {}", id);
        self.events.emit_lossy(WatchdogEvent::SessionClosed {
            session_id: id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
