//! # Domain records
//! Sources, content items and stories as the pipeline reads and writes them.
//! Jobs live in [`crate::queue`] together with their state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ingest::methods::ExtractionMethod;

/// One external content origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub tenant_id: String,
    /// Canonical address handed to extractors.
    pub url: String,
    pub region: Option<String>,
    pub topic_id: Option<String>,
    /// Method used on the most recent attempt, successful or not.
    pub last_method: Option<ExtractionMethod>,
    /// Rolling success rate, always within [0, 100].
    pub success_rate: f64,
    /// Adaptive memory: the method that succeeded last time.
    pub last_successful_method: Option<ExtractionMethod>,
    pub last_execution_ms: Option<i64>,
    /// Free-form quality metrics kept for operators.
    #[serde(default)]
    pub quality_metrics: serde_json::Value,
    pub active: bool,
    /// unix millis of the last acquisition run, if any.
    pub last_run_at: Option<i64>,
}

impl Source {
    /// A fresh, active source with a neutral success rate.
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            url: url.into(),
            region: None,
            topic_id: None,
            last_method: None,
            success_rate: 50.0,
            last_successful_method: None,
            last_execution_ms: None,
            quality_metrics: serde_json::Value::Null,
            active: true,
            last_run_at: None,
        }
    }
}

/// Processing state of an acquired content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    /// Acquired (or handed back) and waiting for a job.
    New,
    Queued,
    Processed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::New => "new",
            ContentStatus::Queued => "queued",
            ContentStatus::Processed => "processed",
        }
    }
}

impl FromStr for ContentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ContentStatus::New),
            "queued" => Ok(ContentStatus::Queued),
            "processed" => Ok(ContentStatus::Processed),
            other => Err(format!("unknown content status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContent {
    pub id: String,
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub status: ContentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    Draft,
    Ready,
    Published,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Draft => "draft",
            StoryStatus::Ready => "ready",
            StoryStatus::Published => "published",
        }
    }

    /// Terminal "good" states that make regeneration redundant.
    pub fn is_good(&self) -> bool {
        matches!(self, StoryStatus::Ready | StoryStatus::Published)
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(StoryStatus::Draft),
            "ready" => Ok(StoryStatus::Ready),
            "published" => Ok(StoryStatus::Published),
            other => Err(format!("unknown story status {other}")),
        }
    }
}

/// Derived artifact ("story") produced by a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub content_id: String,
    pub tenant_id: String,
    pub quality_score: Option<f64>,
    pub slide_count: u32,
    pub status: StoryStatus,
}
