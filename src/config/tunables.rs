// src/config/tunables.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::ingest::scheduler::SchedulerCfg;

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_backoff_cap_ms() -> u64 {
    10_000
}
fn default_extract_timeout_secs() -> u64 {
    30
}
fn default_source_batch_size() -> usize {
    10
}
fn default_inter_source_delay_ms() -> u64 {
    1_000
}
fn default_queue_batch_size() -> usize {
    5
}
fn default_stale_after_secs() -> u64 {
    600
}
fn default_inter_job_delay_ms() -> u64 {
    1_000
}
fn default_generate_timeout_secs() -> u64 {
    180
}
fn default_retry_base_minutes() -> u64 {
    1
}
fn default_threshold() -> f64 {
    60.0
}

/// Acquisition tunables (`[acquisition]` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcquisitionTunables {
    /// Global attempt cap across the whole method chain.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
    #[serde(default = "default_source_batch_size")]
    pub source_batch_size: usize,
    #[serde(default = "default_inter_source_delay_ms")]
    pub inter_source_delay_ms: u64,
}

impl Default for AcquisitionTunables {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            extract_timeout_secs: default_extract_timeout_secs(),
            source_batch_size: default_source_batch_size(),
            inter_source_delay_ms: default_inter_source_delay_ms(),
        }
    }
}

impl AcquisitionTunables {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
        )
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn inter_source_delay(&self) -> Duration {
        Duration::from_millis(self.inter_source_delay_ms)
    }
}

/// Queue tunables (`[queue]` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueTunables {
    #[serde(default = "default_queue_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_inter_job_delay_ms")]
    pub inter_job_delay_ms: u64,
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    #[serde(default = "default_retry_base_minutes")]
    pub retry_base_minutes: u64,
}

impl Default for QueueTunables {
    fn default() -> Self {
        Self {
            batch_size: default_queue_batch_size(),
            stale_after_secs: default_stale_after_secs(),
            inter_job_delay_ms: default_inter_job_delay_ms(),
            generate_timeout_secs: default_generate_timeout_secs(),
            default_max_attempts: default_max_attempts(),
            retry_base_minutes: default_retry_base_minutes(),
        }
    }
}

/// Longest a failed job waits before it becomes claimable again.
const MAX_RETRY_DELAY_SECS: u64 = 24 * 3600;

impl QueueTunables {
    /// Retry visibility: `base * 2^attempts` minutes, capped at one day.
    pub fn retry_backoff(&self) -> BackoffPolicy {
        let base_secs = self.retry_base_minutes.saturating_mul(60);
        BackoffPolicy::new(
            Duration::from_secs(base_secs.min(MAX_RETRY_DELAY_SECS)),
            Duration::from_secs(MAX_RETRY_DELAY_SECS),
        )
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn inter_job_delay(&self) -> Duration {
        Duration::from_millis(self.inter_job_delay_ms)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }
}

/// Auto-approval tunables (`[approval]` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalTunables {
    /// Threshold used when a tenant has none configured.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

impl Default for ApprovalTunables {
    fn default() -> Self {
        Self {
            default_threshold: default_threshold(),
        }
    }
}

/// All tunables, as read from `config/pipeline.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tunables {
    #[serde(default)]
    pub acquisition: AcquisitionTunables,
    #[serde(default)]
    pub queue: QueueTunables,
    #[serde(default)]
    pub approval: ApprovalTunables,
    #[serde(default)]
    pub scheduler: SchedulerCfg,
}

impl Tunables {
    /// Replace nonsensical values with defaults instead of rejecting the file.
    pub fn sanitized(mut self) -> Self {
        let a = &mut self.acquisition;
        if a.max_attempts == 0 {
            a.max_attempts = default_max_attempts();
        }
        if a.backoff_base_ms == 0 {
            a.backoff_base_ms = default_backoff_base_ms();
        }
        if a.backoff_cap_ms < a.backoff_base_ms {
            a.backoff_cap_ms = a.backoff_base_ms.max(default_backoff_cap_ms());
        }
        if a.extract_timeout_secs == 0 {
            a.extract_timeout_secs = default_extract_timeout_secs();
        }
        if a.source_batch_size == 0 {
            a.source_batch_size = default_source_batch_size();
        }

        let q = &mut self.queue;
        if q.batch_size == 0 {
            q.batch_size = default_queue_batch_size();
        }
        if q.stale_after_secs == 0 {
            q.stale_after_secs = default_stale_after_secs();
        }
        if q.generate_timeout_secs == 0 {
            q.generate_timeout_secs = default_generate_timeout_secs();
        }
        if q.default_max_attempts == 0 {
            q.default_max_attempts = default_max_attempts();
        }
        if q.retry_base_minutes == 0 {
            q.retry_base_minutes = default_retry_base_minutes();
        }
        q.retry_base_minutes = q.retry_base_minutes.min(MAX_RETRY_DELAY_SECS / 60);

        let t = self.approval.default_threshold;
        if !t.is_finite() || !(0.0..=100.0).contains(&t) {
            self.approval.default_threshold = default_threshold();
        }
        self
    }
}
