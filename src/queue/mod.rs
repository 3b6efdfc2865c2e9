//! # Processing queue
//! Job records, their parameters, and the job state machine.
//!
//! ```text
//! pending ──claim──▶ processing ──ok──▶ completed
//!    ▲                   │
//!    ├──── retry ────────┤
//!    └──── stale reset ──┘        (exhausted: row deleted, content reset to `new`)
//! ```

pub mod generator;
pub mod manager;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("queue_jobs_claimed_total", "Jobs claimed by this worker.");
        describe_counter!("queue_jobs_completed_total", "Jobs completed with a new story.");
        describe_counter!(
            "queue_jobs_skipped_total",
            "Jobs completed without generation because a good story existed."
        );
        describe_counter!("queue_jobs_retried_total", "Failed jobs scheduled for retry.");
        describe_counter!(
            "queue_jobs_requeued_total",
            "Exhausted jobs deleted with their content reset to new."
        );
        describe_counter!(
            "queue_stale_recovered_total",
            "Processing jobs reset to pending after the staleness window."
        );
        describe_counter!(
            "stories_auto_approved_total",
            "Stories promoted to ready by the approval gate."
        );
        describe_gauge!("queue_last_run_ts", "Unix ts when a queue batch last ran.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    /// Kept for rows written by older workers; never produced here.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether `self -> next` is a legal edge of the state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Pending)
        )
    }

    /// Validate an edge, returning the target state.
    pub fn transition(&self, job_id: &str, next: JobStatus) -> Result<JobStatus, PipelineError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PipelineError::InvalidTransition {
                job_id: job_id.to_string(),
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status {other}")),
        }
    }
}

/// Optional knobs forwarded to the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Job parameters, one variant per job kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobParams {
    GenerateSlides {
        #[serde(flatten)]
        options: SlideOptions,
    },
    RegenerateSlides {
        #[serde(rename = "storyId")]
        story_id: String,
        #[serde(flatten)]
        options: SlideOptions,
    },
}

impl JobParams {
    pub fn generate(options: SlideOptions) -> Self {
        JobParams::GenerateSlides { options }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::GenerateSlides { .. } => JobKind::GenerateSlides,
            JobParams::RegenerateSlides { .. } => JobKind::RegenerateSlides,
        }
    }

    pub fn options(&self) -> &SlideOptions {
        match self {
            JobParams::GenerateSlides { options } => options,
            JobParams::RegenerateSlides { options, .. } => options,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    GenerateSlides,
    RegenerateSlides,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::GenerateSlides => "generate_slides",
            JobKind::RegenerateSlides => "regenerate_slides",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "generate_slides" => Ok(JobKind::GenerateSlides),
            "regenerate_slides" => Ok(JobKind::RegenerateSlides),
            other => Err(format!("unknown job kind {other}")),
        }
    }
}

/// One row of the processing queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    /// The content item this job derives from.
    pub content_id: String,
    pub params: JobParams,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Not claimable before this instant.
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}
