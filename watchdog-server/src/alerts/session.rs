//! Per-dashboard alert state
//!
//! A session remembers which objects it already alerted on, when the alarm
//! last sounded and the most recent alert lines. Time is passed in by the
//! caller so evaluation stays deterministic under test.

use super::detection::{Detection, DetectionSummary};
use super::modes::{DetectorOptions, MonitorMode, DEFAULT_TARGET};
use super::AlertError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use uuid::Uuid;
use watchdog_common::config::AlertConfig;

/// Alert engine tuning
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSettings {
    /// Minimum spacing between two audible alarms
    pub alarm_interval: Duration,
    /// Alert lines kept per session
    pub recent_alert_limit: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self::from(&AlertConfig::default())
    }
}

impl From<&AlertConfig> for AlertSettings {
    fn from(config: &AlertConfig) -> Self {
        Self {
            alarm_interval: Duration::from_millis(config.alarm_interval_ms),
            recent_alert_limit: config.recent_alert_limit,
        }
    }
}

/// One fired alert
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub label: String,
    pub confidence: u8,
    /// Whether the dashboard should sound the alarm for it
    pub alarm: bool,
    pub timestamp: DateTime<Utc>,
}

/// Result of evaluating one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub alerts: Vec<Alert>,
    pub alarm: bool,
    pub detections: Vec<DetectionSummary>,
    pub recent_alerts: Vec<Alert>,
}

/// Read-only view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub mode: MonitorMode,
    pub target: Option<String>,
    pub detector: DetectorOptions,
    pub frames_evaluated: u64,
    pub alerts_raised: u64,
    pub recent_alerts: Vec<Alert>,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    mode: MonitorMode,
    target: String,
    seen: HashMap<String, Instant>,
    last_alarm: Option<Instant>,
    recent: VecDeque<Alert>,
    frames_evaluated: u64,
    alerts_raised: u64,
    opened_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: Uuid, mode: MonitorMode, target: Option<&str>) -> Result<Self, AlertError> {
        let target = match target {
            Some(target) => {
                if !mode.supports_target() {
                    return Err(AlertError::TargetNotSupported(mode));
                }
                normalize_target(target)?
            }
            None => DEFAULT_TARGET.to_string(),
        };

        Ok(Self {
            id,
            mode,
            target,
            seen: HashMap::new(),
            last_alarm: None,
            recent: VecDeque::new(),
            frames_evaluated: 0,
            alerts_raised: 0,
            opened_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn set_target(&mut self, target: &str) -> Result<(), AlertError> {
        if !self.mode.supports_target() {
            return Err(AlertError::TargetNotSupported(self.mode));
        }
        self.target = normalize_target(target)?;
        Ok(())
    }

    /// Forget latches, dedup keys, the alarm clock and recent alerts
    pub fn reset(&mut self) {
        self.seen.clear();
        self.last_alarm = None;
        self.recent.clear();
    }

    pub fn evaluate(
        &mut self,
        detections: &[Detection],
        now: Instant,
        settings: &AlertSettings,
    ) -> Evaluation {
        self.frames_evaluated += 1;
        self.expire_seen(now);

        let fresh: Vec<_> = self
            .mode
            .triggers(detections, &self.target)
            .into_iter()
            .filter(|trigger| match &trigger.dedup_key {
                Some(key) if self.seen.contains_key(key) => false,
                Some(key) => {
                    self.seen.insert(key.clone(), now);
                    true
                }
                None => true,
            })
            .collect();

        let alarm = !fresh.is_empty() && self.alarm_due(now, settings.alarm_interval);
        if alarm {
            self.last_alarm = Some(now);
        }

        let timestamp = Utc::now();
        let alerts: Vec<Alert> = fresh
            .into_iter()
            .map(|trigger| Alert {
                title: trigger.title,
                message: trigger.message,
                label: trigger.label,
                confidence: trigger.confidence,
                alarm,
                timestamp,
            })
            .collect();

        for alert in &alerts {
            self.recent.push_front(alert.clone());
        }
        self.recent.truncate(settings.recent_alert_limit);
        self.alerts_raised += alerts.len() as u64;

        Evaluation {
            alerts,
            alarm,
            detections: detections.iter().map(DetectionSummary::from).collect(),
            recent_alerts: self.recent.iter().cloned().collect(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            mode: self.mode,
            target: self.mode.supports_target().then(|| self.target.clone()),
            detector: self.mode.detector_options(),
            frames_evaluated: self.frames_evaluated,
            alerts_raised: self.alerts_raised,
            recent_alerts: self.recent.iter().cloned().collect(),
            opened_at: self.opened_at,
        }
    }

    fn alarm_due(&self, now: Instant, interval: Duration) -> bool {
        match self.last_alarm {
            Some(last) => now.saturating_duration_since(last) >= interval,
            None => true,
        }
    }

    fn expire_seen(&mut self, now: Instant) {
        if let Some(window) = self.mode.repeat_window() {
            self.seen
                .retain(|_, first_seen| now.saturating_duration_since(*first_seen) < window);
        }
    }
}

fn normalize_target(target: &str) -> Result<String, AlertError> {
    let target = target.trim().to_lowercase();
    if target.is_empty() {
        return Err(AlertError::InvalidTarget(
            "target must not be empty".to_string(),
        ));
    }
    Ok(target)
}
