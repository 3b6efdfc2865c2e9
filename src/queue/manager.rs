//! # Job Queue Manager
//! One invocation drives a bounded batch of jobs, strictly one after another:
//!
//! 1. reset stale `processing` jobs, then hand exhausted ones back upstream
//! 2. claim candidates one by one (compare-and-swap; losers are skipped)
//! 3. skip generation when a ready/published story already exists
//! 4. call the generator under a timeout
//! 5. success: store the story as draft, complete the job, run auto-approval
//! 6. failure: retry after `base * 2^attempts`, or abandon and requeue content
//!
//! Only datastore failures outside a single job escape as `Err`; everything
//! that goes wrong inside a job becomes part of its [`JobOutcome`].

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::approval::ApprovalGate;
use crate::config::QueueTunables;
use crate::error::{PipelineError, Result};
use crate::models::{ContentStatus, Story, StoryStatus};
use crate::queue::generator::{GenerateError, GeneratedStory, GenerationRequest, Generator};
use crate::queue::{Job, JobKind, JobParams, JobStatus};
use crate::store::Store;

/// Run-scoping parameters accepted by the queue trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueRequest {
    pub batch_size: Option<usize>,
    pub job_type: Option<JobKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    /// Content item the job works on.
    pub target_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_count: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    fn ok(job: &Job, slide_count: Option<u32>, skipped: bool) -> Self {
        Self {
            job_id: job.id.clone(),
            target_id: job.content_id.clone(),
            success: true,
            slide_count,
            skipped,
            error: None,
        }
    }

    fn failed(job: &Job, error: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            target_id: job.content_id.clone(),
            success: false,
            slide_count: None,
            skipped: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueResult {
    pub success: bool,
    pub processed: usize,
    pub results: Vec<JobOutcome>,
    /// Stale jobs reset to pending at the start of the run.
    pub recovered: usize,
    /// Exhausted jobs deleted with their content handed back as `new`.
    pub requeued: usize,
}

pub struct QueueManager {
    store: Arc<Store>,
    generator: Arc<dyn Generator>,
    gate: ApprovalGate,
    tunables: QueueTunables,
}

impl QueueManager {
    pub fn new(
        store: Arc<Store>,
        generator: Arc<dyn Generator>,
        gate: ApprovalGate,
        tunables: QueueTunables,
    ) -> Self {
        super::ensure_metrics_described();
        Self {
            store,
            generator,
            gate,
            tunables,
        }
    }

    pub async fn process_batch(&self, req: &QueueRequest) -> Result<QueueResult> {
        self.process_batch_at(req, Utc::now()).await
    }

    /// Same as [`QueueManager::process_batch`] with an explicit wall-clock
    /// start. Later timestamps in the run are `now` plus elapsed monotonic time.
    pub async fn process_batch_at(
        &self,
        req: &QueueRequest,
        now: DateTime<Utc>,
    ) -> Result<QueueResult> {
        let t0 = Instant::now();
        let clock = || {
            now + chrono::Duration::from_std(t0.elapsed()).unwrap_or(chrono::Duration::zero())
        };

        let stale_after = self.tunables.stale_after();
        let (recovered, requeued) = self
            .store
            .call(move |store| {
                let recovered = store.recover_stale(now, stale_after)?;
                Ok((recovered, sweep_exhausted(store)?))
            })
            .await?;
        if recovered > 0 {
            counter!("queue_stale_recovered_total").increment(recovered as u64);
            warn!(recovered, "reset stale processing jobs");
        }

        let batch = req.batch_size.unwrap_or(self.tunables.batch_size).max(1);
        let job_type = req.job_type;
        let candidates = self
            .store
            .call(move |store| store.claimable_job_ids(now, batch, job_type))
            .await?;
        debug!(candidates = candidates.len(), batch, job_type = ?job_type, "queue run");

        let mut results = Vec::with_capacity(candidates.len());
        for id in candidates {
            if !results.is_empty() {
                tokio::time::sleep(self.tunables.inter_job_delay()).await;
            }
            let at = clock();
            let claim_id = id.clone();
            let claimed = self
                .store
                .call(move |store| store.try_claim(&claim_id, at))
                .await?;
            let Some(job) = claimed else {
                debug!(job_id = %id, "claim lost to another worker");
                continue;
            };
            counter!("queue_jobs_claimed_total").increment(1);

            let outcome = match self.process_job(&job, &clock).await {
                Ok(o) => o,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "job bookkeeping failed; left for stale recovery");
                    JobOutcome::failed(&job, e.to_string())
                }
            };
            results.push(outcome);
        }

        gauge!("queue_last_run_ts").set(now.timestamp() as f64);
        info!(
            processed = results.len(),
            succeeded = results.iter().filter(|r| r.success).count(),
            recovered,
            requeued,
            "queue run finished"
        );
        Ok(QueueResult {
            success: true,
            processed: results.len(),
            results,
            recovered,
            requeued,
        })
    }

    async fn process_job<F>(&self, job: &Job, clock: &F) -> Result<JobOutcome>
    where
        F: Fn() -> DateTime<Utc>,
    {
        if let JobParams::GenerateSlides { .. } = job.params {
            let pending = job.clone();
            let existing = self
                .store
                .call(move |store| complete_if_story_exists(store, &pending))
                .await?;
            if let Some(slide_count) = existing {
                return Ok(JobOutcome::ok(job, Some(slide_count), true));
            }
        }

        let req = GenerationRequest {
            job_id: job.id.clone(),
            content_id: job.content_id.clone(),
            params: job.params.clone(),
        };
        let limit = self.tunables.generate_timeout();
        let generated = match tokio::time::timeout(limit, self.generator.generate(&req)).await {
            Ok(r) => r,
            Err(_) => Err(GenerateError::Timeout(limit.as_secs())),
        };

        match generated {
            Ok(gen) => {
                let slide_count = gen.slide_count;
                let (done, gate, at) = (job.clone(), self.gate, clock());
                self.store
                    .call(move |store| record_generated(store, &done, &gen, gate, at))
                    .await?;
                Ok(JobOutcome::ok(job, Some(slide_count), false))
            }
            Err(e) => self.handle_failure(job, &e, clock()).await,
        }
    }

    async fn handle_failure(
        &self,
        job: &Job,
        err: &GenerateError,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome> {
        let message = err.to_string();
        let job_id = job.id.clone();
        if job.has_attempts_left() {
            let delay = self.tunables.retry_backoff().delay(job.attempts);
            let visible_at =
                now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::days(1));
            let error = message.clone();
            self.store
                .call(move |store| store.schedule_retry(&job_id, &error, visible_at))
                .await?;
            counter!("queue_jobs_retried_total").increment(1);
            warn!(
                job_id = %job.id,
                attempts = job.attempts,
                max_attempts = job.max_attempts,
                retry_in_secs = delay.as_secs(),
                error = %message,
                "job failed; retry scheduled"
            );
        } else {
            let content_id = self
                .store
                .call(move |store| store.abandon_and_requeue(&job_id, JobStatus::Processing))
                .await?;
            counter!("queue_jobs_requeued_total").increment(1);
            warn!(
                job_id = %job.id,
                content_id = %content_id,
                attempts = job.attempts,
                error = %message,
                "job exhausted; content handed back to acquisition"
            );
        }
        Ok(JobOutcome::failed(job, message))
    }
}

/// Pending jobs that reached `max_attempts` (only possible after a stale
/// reset) can never be claimed; give their content back to acquisition.
fn sweep_exhausted(store: &Store) -> Result<usize> {
    let mut n = 0;
    for id in store.exhausted_pending_ids()? {
        match store.abandon_and_requeue(&id, JobStatus::Pending) {
            Ok(content_id) => {
                n += 1;
                counter!("queue_jobs_requeued_total").increment(1);
                warn!(job_id = %id, content_id = %content_id, "exhausted job requeued upstream");
            }
            Err(PipelineError::InvalidTransition { .. } | PipelineError::NotFound { .. }) => {
                debug!(job_id = %id, "exhausted job already handled elsewhere");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

/// Completes a generation job without calling the generator when its content
/// already has a ready or published story. Returns that story's slide count.
fn complete_if_story_exists(store: &Store, job: &Job) -> Result<Option<u32>> {
    let Some(story) = store.story_for_content(&job.content_id)? else {
        return Ok(None);
    };
    if !story.status.is_good() {
        return Ok(None);
    }
    store.complete_job(
        &job.id,
        &json!({
            "skipped": true,
            "reason": format!("story already {}", story.status),
            "storyId": story.id,
        }),
    )?;
    mark_processed(store, &job.content_id)?;
    counter!("queue_jobs_skipped_total").increment(1);
    info!(job_id = %job.id, story_id = %story.id, "generation skipped; story exists");
    Ok(Some(story.slide_count))
}

fn record_generated(
    store: &Store,
    job: &Job,
    gen: &GeneratedStory,
    gate: ApprovalGate,
    at: DateTime<Utc>,
) -> Result<()> {
    let tenant_id = store.tenant_for_content(&job.content_id)?.unwrap_or_default();
    let story = Story {
        id: gen.story_id.clone(),
        content_id: job.content_id.clone(),
        tenant_id,
        quality_score: gen.quality_score,
        slide_count: gen.slide_count,
        status: StoryStatus::Draft,
    };
    store.upsert_story(&story, at)?;
    store.complete_job(
        &job.id,
        &json!({
            "storyId": gen.story_id,
            "slideCount": gen.slide_count,
            "qualityScore": gen.quality_score,
        }),
    )?;
    counter!("queue_jobs_completed_total").increment(1);
    if let Err(e) = gate.apply(store, &story) {
        warn!(job_id = %job.id, story_id = %story.id, error = %e, "auto-approval failed");
    }
    mark_processed(store, &job.content_id)?;
    info!(job_id = %job.id, story_id = %story.id, slides = gen.slide_count, "job completed");
    Ok(())
}

fn mark_processed(store: &Store, content_id: &str) -> Result<()> {
    match store.set_content_status(content_id, ContentStatus::Processed) {
        Err(PipelineError::NotFound { .. }) => {
            warn!(content_id, "content item vanished before it could be marked processed");
            Ok(())
        }
        other => other,
    }
}
