// src/ingest/scheduler.rs
//! In-process periodic triggers for deployments without an external cron.
//! Each tick runs one acquisition batch or one queue batch; a slow run delays
//! the next tick instead of overlapping it.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::runner::{AcquireRequest, AcquisitionRunner};
use crate::queue::manager::{QueueManager, QueueRequest};

/// `[scheduler]` table of the tunables file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerCfg {
    /// Seconds between acquisition batches; 0 disables the trigger.
    pub acquire_interval_secs: u64,
    /// Seconds between queue batches; 0 disables the trigger.
    pub queue_interval_secs: u64,
}

fn ticker(secs: u64) -> tokio::time::Interval {
    let mut t = tokio::time::interval(Duration::from_secs(secs));
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

/// Spawn the acquisition trigger, or nothing when disabled.
pub fn spawn_acquisition(cfg: SchedulerCfg, runner: Arc<AcquisitionRunner>) -> Option<JoinHandle<()>> {
    if cfg.acquire_interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut t = ticker(cfg.acquire_interval_secs);
        loop {
            t.tick().await;
            counter!("scheduler_ticks_total", "trigger" => "acquire").increment(1);
            match runner.run(&AcquireRequest::default()).await {
                Ok(reports) => tracing::debug!(target: "scheduler", sources = reports.len(), "acquire tick"),
                Err(e) => tracing::error!(target: "scheduler", error = %e, "acquire tick failed"),
            }
        }
    }))
}

/// Spawn the queue trigger, or nothing when disabled.
pub fn spawn_queue(cfg: SchedulerCfg, manager: Arc<QueueManager>) -> Option<JoinHandle<()>> {
    if cfg.queue_interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut t = ticker(cfg.queue_interval_secs);
        loop {
            t.tick().await;
            counter!("scheduler_ticks_total", "trigger" => "queue").increment(1);
            match manager.process_batch(&QueueRequest::default()).await {
                Ok(res) => tracing::debug!(target: "scheduler", processed = res.processed, "queue tick"),
                Err(e) => tracing::error!(target: "scheduler", error = %e, "queue tick failed"),
            }
        }
    }))
}
