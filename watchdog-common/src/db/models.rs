//! Database models

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a registered stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Cctv,
    Exam,
    College,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Cctv, StreamKind::Exam, StreamKind::College];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Cctv => "cctv",
            StreamKind::Exam => "exam",
            StreamKind::College => "college",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cctv" => Ok(StreamKind::Cctv),
            "exam" => Ok(StreamKind::Exam),
            "college" => Ok(StreamKind::College),
            other => Err(Error::InvalidInput(format!(
                "Invalid stream type '{}' (expected cctv, exam or college)",
                other
            ))),
        }
    }
}

/// Relay state of a registered stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Active,
    #[default]
    Inactive,
    Error,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Active => "active",
            StreamStatus::Inactive => "inactive",
            StreamStatus::Error => "error",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(StreamStatus::Active),
            "inactive" => Ok(StreamStatus::Inactive),
            "error" => Ok(StreamStatus::Error),
            other => Err(Error::InvalidInput(format!(
                "Invalid stream status '{}' (expected active, inactive or error)",
                other
            ))),
        }
    }
}

/// A registered stream source as returned by the catalog API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub id: String,
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StreamKind,
    pub status: StreamStatus,
    pub last_active: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Validated input for registering a stream
#[derive(Debug, Clone, PartialEq)]
pub struct NewStream {
    pub url: String,
    pub name: String,
    pub kind: StreamKind,
}

impl NewStream {
    /// Validate raw request fields
    ///
    /// Every field must be present and non-blank; `kind` must name a
    /// [`StreamKind`].
    pub fn parse(url: Option<&str>, name: Option<&str>, kind: Option<&str>) -> Result<Self> {
        let url = required("url", url)?;
        let name = required("name", name)?;
        let kind = required("type", kind)?.parse::<StreamKind>()?;

        if url.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput("url must not contain whitespace".to_string()));
        }

        Ok(Self { url, name, kind })
    }
}

fn required(field: &str, value: Option<&str>) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::InvalidInput(format!("{} is required", field))),
    }
}
