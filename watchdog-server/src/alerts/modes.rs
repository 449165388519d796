//! Monitoring modes and their trigger policies

use super::detection::Detection;
use super::AlertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TARGET: &str = "person";

pub const FIRE_INDICATORS: &[&str] = &["smoke", "fire", "flame"];

pub const SUSPICIOUS_ITEMS: &[&str] = &["cell phone", "book", "laptop", "remote", "keyboard", "mouse"];

pub const DANGEROUS_ANIMALS: &[&str] = &[
    "bear", "lion", "tiger", "wolf", "leopard", "elephant", "zebra", "giraffe", "cat", "dog",
];

/// Substrings marking an object as an identity document
pub const ID_INDICATORS: &[&str] = &["card", "id", "book"];

/// Score a detection must exceed to trigger fire/exam/wildlife/college alerts
pub const TRIGGER_SCORE: f32 = 0.7;

/// Score an ID-like object must exceed to count as present
pub const ID_SCORE: f32 = 0.5;

/// How long an exam item is remembered before it may alert again
pub const EXAM_REPEAT_WINDOW: Duration = Duration::from_secs(5);

/// Fire alerts latch under this key until the session is reset
const FIRE_LATCH_KEY: &str = "fire";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    Cctv,
    Fire,
    Exam,
    Wildlife,
    College,
}

/// Model options a dashboard should use for a mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorOptions {
    pub max_boxes: u32,
    pub min_score: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_boxes: 100,
            min_score: 0.5,
            iou_threshold: 0.5,
        }
    }
}

/// Mode description served to dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeInfo {
    pub mode: MonitorMode,
    pub title: &'static str,
    pub trigger_classes: Vec<&'static str>,
    pub trigger_score: Option<f32>,
    pub configurable_target: bool,
    pub detector: DetectorOptions,
}

/// A detection that satisfied a mode's policy
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub label: String,
    pub confidence: u8,
    /// Notification heading
    pub title: String,
    /// Line for the session's recent-alert list
    pub message: String,
    /// Identity used to suppress repeats; `None` alerts on every frame
    pub dedup_key: Option<String>,
}

impl MonitorMode {
    pub const ALL: [MonitorMode; 5] = [
        MonitorMode::Cctv,
        MonitorMode::Fire,
        MonitorMode::Exam,
        MonitorMode::Wildlife,
        MonitorMode::College,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorMode::Cctv => "cctv",
            MonitorMode::Fire => "fire",
            MonitorMode::Exam => "exam",
            MonitorMode::Wildlife => "wildlife",
            MonitorMode::College => "college",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MonitorMode::Cctv => "CCTV Monitoring",
            MonitorMode::Fire => "Fire Safety",
            MonitorMode::Exam => "Exam Proctoring",
            MonitorMode::Wildlife => "Wildlife Watch",
            MonitorMode::College => "Campus ID Check",
        }
    }

    pub fn detector_options(&self) -> DetectorOptions {
        match self {
            MonitorMode::Exam => DetectorOptions {
                max_boxes: 20,
                min_score: 0.6,
                iou_threshold: 0.5,
            },
            MonitorMode::College => DetectorOptions {
                max_boxes: 20,
                min_score: 0.5,
                iou_threshold: 0.5,
            },
            _ => DetectorOptions::default(),
        }
    }

    pub fn trigger_classes(&self) -> Vec<&'static str> {
        match self {
            MonitorMode::Cctv => vec![DEFAULT_TARGET],
            MonitorMode::Fire => FIRE_INDICATORS.to_vec(),
            MonitorMode::Exam => SUSPICIOUS_ITEMS.to_vec(),
            MonitorMode::Wildlife => DANGEROUS_ANIMALS.to_vec(),
            MonitorMode::College => vec!["person"],
        }
    }

    pub fn trigger_score(&self) -> Option<f32> {
        match self {
            MonitorMode::Cctv => None,
            _ => Some(TRIGGER_SCORE),
        }
    }

    /// Only CCTV mode watches a user-chosen class
    pub fn supports_target(&self) -> bool {
        matches!(self, MonitorMode::Cctv)
    }

    /// How long a dedup key suppresses repeats; `None` is the session lifetime
    pub fn repeat_window(&self) -> Option<Duration> {
        match self {
            MonitorMode::Exam => Some(EXAM_REPEAT_WINDOW),
            _ => None,
        }
    }

    pub fn info(&self) -> ModeInfo {
        ModeInfo {
            mode: *self,
            title: self.title(),
            trigger_classes: self.trigger_classes(),
            trigger_score: self.trigger_score(),
            configurable_target: self.supports_target(),
            detector: self.detector_options(),
        }
    }

    /// Apply the mode's policy to one frame
    ///
    /// `target` is only consulted in CCTV mode. Repeat suppression is left
    /// to the session, which owns the dedup memory.
    pub fn triggers(&self, detections: &[Detection], target: &str) -> Vec<Trigger> {
        match self {
            MonitorMode::Cctv => cctv_triggers(detections, target),
            MonitorMode::Fire => fire_triggers(detections),
            MonitorMode::Exam => exam_triggers(detections),
            MonitorMode::Wildlife => wildlife_triggers(detections),
            MonitorMode::College => college_triggers(detections),
        }
    }
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorMode {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        MonitorMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| AlertError::UnknownMode(s.to_string()))
    }
}

fn cctv_triggers(detections: &[Detection], target: &str) -> Vec<Trigger> {
    let target = target.trim().to_lowercase();
    detections
        .iter()
        .find(|d| d.class_name() == target)
        .map(|d| Trigger {
            label: d.label.clone(),
            confidence: d.confidence_percent(),
            title: target.clone(),
            message: format!(
                "{} detected with {}% confidence",
                d.label,
                d.confidence_percent()
            ),
            dedup_key: None,
        })
        .into_iter()
        .collect()
}

fn fire_triggers(detections: &[Detection]) -> Vec<Trigger> {
    detections
        .iter()
        .filter(|d| FIRE_INDICATORS.contains(&d.class_name().as_str()) && d.score > TRIGGER_SCORE)
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(|d| Trigger {
            label: d.label.clone(),
            // Fire is always reported at full severity
            confidence: 100,
            title: "FIRE DETECTED".to_string(),
            message: "FIRE DETECTED! Please evacuate immediately and contact emergency services."
                .to_string(),
            dedup_key: Some(FIRE_LATCH_KEY.to_string()),
        })
        .into_iter()
        .collect()
}

fn exam_triggers(detections: &[Detection]) -> Vec<Trigger> {
    detections
        .iter()
        .filter(|d| {
            let class = d.class_name();
            SUSPICIOUS_ITEMS.iter().any(|item| class.contains(item)) && d.score > TRIGGER_SCORE
        })
        .map(|d| Trigger {
            label: d.label.clone(),
            confidence: d.confidence_percent(),
            title: format!("Suspicious item detected: {}", d.label),
            message: format!("{} detected ({}% confidence)", d.label, d.confidence_percent()),
            dedup_key: Some(d.position_key(&d.class_name())),
        })
        .collect()
}

fn wildlife_triggers(detections: &[Detection]) -> Vec<Trigger> {
    detections
        .iter()
        .filter(|d| DANGEROUS_ANIMALS.contains(&d.class_name().as_str()) && d.score > TRIGGER_SCORE)
        .map(|d| Trigger {
            label: d.label.clone(),
            confidence: d.confidence_percent(),
            title: format!("Wildlife detected: {}", d.label),
            message: format!("{} detected ({}% confidence)", d.label, d.confidence_percent()),
            dedup_key: Some(d.class_name()),
        })
        .collect()
}

fn college_triggers(detections: &[Detection]) -> Vec<Trigger> {
    let id_present = detections.iter().any(|d| {
        let class = d.class_name();
        ID_INDICATORS.iter().any(|marker| class.contains(marker)) && d.score > ID_SCORE
    });
    if id_present {
        return Vec::new();
    }

    detections
        .iter()
        .filter(|d| d.class_name() == "person" && d.score > TRIGGER_SCORE)
        .map(|d| Trigger {
            label: d.label.clone(),
            confidence: d.confidence_percent(),
            title: "Person detected without ID card".to_string(),
            message: format!(
                "Person without ID detected ({}% confidence)",
                d.confidence_percent()
            ),
            dedup_key: Some(d.position_key("person")),
        })
        .collect()
}
