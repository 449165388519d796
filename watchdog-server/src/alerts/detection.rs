//! Detection frames as produced by the dashboard's pretrained model

use super::AlertError;
use serde::{Deserialize, Serialize};

/// Overlay colors by confidence band
pub const HIGH_CONFIDENCE_COLOR: &str = "#00FF00";
pub const MEDIUM_CONFIDENCE_COLOR: &str = "#FFA500";
pub const LOW_CONFIDENCE_COLOR: &str = "#FF0000";

/// One predicted object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Model class name, e.g. "person" or "cell phone"
    #[serde(rename = "class")]
    pub label: String,
    /// Model confidence in [0, 1]
    pub score: f32,
    /// `[x, y, width, height]` in video pixels
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn new(label: impl Into<String>, score: f32, bbox: [f32; 4]) -> Self {
        Self {
            label: label.into(),
            score,
            bbox,
        }
    }

    pub fn validate(&self) -> Result<(), AlertError> {
        if self.label.trim().is_empty() {
            return Err(AlertError::InvalidDetection("class must not be empty".to_string()));
        }
        if !self.score.is_finite() || !(0.0..=1.0).contains(&self.score) {
            return Err(AlertError::InvalidDetection(format!(
                "score for '{}' must be between 0 and 1, got {}",
                self.label, self.score
            )));
        }
        if self.bbox.iter().any(|v| !v.is_finite()) {
            return Err(AlertError::InvalidDetection(format!(
                "bbox for '{}' must contain finite numbers",
                self.label
            )));
        }
        Ok(())
    }

    /// Lowercased class name used by every trigger comparison
    pub fn class_name(&self) -> String {
        self.label.trim().to_lowercase()
    }

    /// Confidence as a whole percentage
    pub fn confidence_percent(&self) -> u8 {
        (self.score * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Identity of an object by class and rounded top-left corner
    pub fn position_key(&self, prefix: &str) -> String {
        format!(
            "{}_{}_{}",
            prefix,
            self.bbox[0].round() as i64,
            self.bbox[1].round() as i64
        )
    }
}

/// Per-detection display row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub label: String,
    pub confidence: u8,
    pub color: &'static str,
}

impl From<&Detection> for DetectionSummary {
    fn from(detection: &Detection) -> Self {
        Self {
            label: detection.label.clone(),
            confidence: detection.confidence_percent(),
            color: overlay_color(detection.score),
        }
    }
}

/// Bounding box color for a confidence score
pub fn overlay_color(score: f32) -> &'static str {
    if score > 0.8 {
        HIGH_CONFIDENCE_COLOR
    } else if score > 0.6 {
        MEDIUM_CONFIDENCE_COLOR
    } else {
        LOW_CONFIDENCE_COLOR
    }
}
