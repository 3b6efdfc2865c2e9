//! # Acquisition Executor
//! Walks a method chain against one source until something yields items.
//!
//! - At most `max_attempts` extractor calls across the whole chain.
//! - Non-retryable failures advance immediately; retryable ones wait
//!   `min(base * 2^n, cap)` first (n = 0-based attempt ordinal).
//! - Exactly one performance-store write per `execute` call.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::AcquisitionTunables;
use crate::ingest::classify::{classify, ErrorClassification};
use crate::ingest::methods::ExtractionMethod;
use crate::ingest::performance::{MemoryUpdate, PerformanceStore, PerformanceUpdate, RunOutcome};
use crate::ingest::types::{ContentItem, ExtractError, ExtractRequest, Extractor};
use crate::models::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub extract_timeout: Duration,
}

impl Default for ExecutorPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::acquisition(),
            extract_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AcquisitionTunables> for ExecutorPolicy {
    fn from(t: &AcquisitionTunables) -> Self {
        Self {
            max_attempts: t.max_attempts,
            backoff: t.backoff(),
            extract_timeout: t.extract_timeout(),
        }
    }
}

/// One extractor call. Kept in memory and logs only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub method: ExtractionMethod,
    /// 1-based ordinal across the whole chain.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ErrorClassification>,
    /// Backoff slept after this attempt.
    pub delay_ms: u64,
}

impl AttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct AcquisitionSuccess {
    pub items: Vec<ContentItem>,
    pub method: ExtractionMethod,
    pub attempts: Vec<AttemptRecord>,
    pub execution_ms: u64,
}

#[derive(Debug, Clone, Error)]
#[error("all extraction methods failed for source {source_id}: tried {}", join_methods(.methods_tried))]
pub struct AcquisitionFailure {
    pub source_id: String,
    pub methods_tried: Vec<ExtractionMethod>,
    pub attempts: Vec<AttemptRecord>,
    pub execution_ms: u64,
}

fn join_methods(methods: &[ExtractionMethod]) -> String {
    if methods.is_empty() {
        return "nothing".to_string();
    }
    methods
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct Executor {
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn PerformanceStore>,
    policy: ExecutorPolicy,
}

impl Executor {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn PerformanceStore>,
        policy: ExecutorPolicy,
    ) -> Self {
        Self {
            extractor,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &ExecutorPolicy {
        &self.policy
    }

    pub async fn execute(
        &self,
        source: &Source,
        chain: &[ExtractionMethod],
    ) -> Result<AcquisitionSuccess, AcquisitionFailure> {
        let t0 = Instant::now();
        let mut records: Vec<AttemptRecord> = Vec::new();
        let mut tried: Vec<ExtractionMethod> = Vec::new();
        let max = self.policy.max_attempts;

        for (idx, &method) in chain.iter().enumerate() {
            let ordinal = records.len() as u32;
            if ordinal >= max {
                debug!(source_id = %source.id, %method, "attempt budget exhausted");
                break;
            }
            tried.push(method);
            counter!("acquisition_attempts_total", "method" => method.as_str()).increment(1);

            let req = ExtractRequest {
                address: source.url.clone(),
                source_id: source.id.clone(),
                region: source.region.clone(),
                topic_id: source.topic_id.clone(),
                method,
            };
            let started_at = Utc::now();
            let call_t0 = Instant::now();
            let outcome = self.call_extractor(&req).await;
            let elapsed_ms = call_t0.elapsed().as_millis() as u64;

            let err = match outcome {
                Ok(items) => {
                    records.push(AttemptRecord {
                        method,
                        attempt: ordinal + 1,
                        started_at,
                        elapsed_ms,
                        items: items.len(),
                        error: None,
                        classification: None,
                        delay_ms: 0,
                    });
                    let execution_ms = t0.elapsed().as_millis() as u64;
                    self.record_success(source, method, items.len(), records.len(), execution_ms)
                        .await;
                    info!(
                        source_id = %source.id,
                        %method,
                        attempts = records.len(),
                        items = items.len(),
                        execution_ms,
                        "acquisition succeeded"
                    );
                    return Ok(AcquisitionSuccess {
                        items,
                        method,
                        attempts: records,
                        execution_ms,
                    });
                }
                Err(e) => e,
            };

            let class = classify(&err);
            warn!(
                source_id = %source.id,
                %method,
                attempt = ordinal + 1,
                category = %class.category,
                severity = %class.severity,
                retryable = class.retryable,
                error = %err,
                "acquisition attempt failed"
            );
            counter!("acquisition_failures_total", "category" => class.category.as_str())
                .increment(1);

            let attempts_left = ordinal + 1 < max;
            let has_next = idx + 1 < chain.len();
            let delay = if class.retryable && attempts_left && has_next {
                self.policy.backoff.delay(ordinal)
            } else {
                Duration::ZERO
            };

            records.push(AttemptRecord {
                method,
                attempt: ordinal + 1,
                started_at,
                elapsed_ms,
                items: 0,
                error: Some(err.to_string()),
                classification: Some(class),
                delay_ms: delay.as_millis() as u64,
            });

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let execution_ms = t0.elapsed().as_millis() as u64;
        self.record_failure(source, &tried, &records, execution_ms).await;
        Err(AcquisitionFailure {
            source_id: source.id.clone(),
            methods_tried: tried,
            attempts: records,
            execution_ms,
        })
    }

    /// Extractor call bounded by the timeout. Zero items counts as a failure.
    async fn call_extractor(&self, req: &ExtractRequest) -> Result<Vec<ContentItem>, ExtractError> {
        let timeout = self.policy.extract_timeout;
        match tokio::time::timeout(timeout, self.extractor.extract(req)).await {
            Ok(Ok(items)) if items.is_empty() => Err(ExtractError::Empty),
            Ok(Ok(items)) => Ok(items),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ExtractError::Timeout(timeout.as_secs())),
        }
    }

    async fn record_success(
        &self,
        source: &Source,
        method: ExtractionMethod,
        items: usize,
        attempts: usize,
        execution_ms: u64,
    ) {
        histogram!("acquisition_duration_ms").record(execution_ms as f64);
        counter!("acquisition_runs_total", "outcome" => "success").increment(1);
        let update = PerformanceUpdate {
            outcome: RunOutcome::Success,
            last_method: method,
            memory: MemoryUpdate::Set(method),
            execution_ms: execution_ms as i64,
            quality_metrics: serde_json::json!({
                "lastItems": items,
                "lastAttempts": attempts,
                "lastOutcome": "success",
            }),
        };
        self.write(source, update).await;
    }

    async fn record_failure(
        &self,
        source: &Source,
        tried: &[ExtractionMethod],
        records: &[AttemptRecord],
        execution_ms: u64,
    ) {
        histogram!("acquisition_duration_ms").record(execution_ms as f64);
        counter!("acquisition_runs_total", "outcome" => "failure").increment(1);

        // a remembered method that just failed is forgotten so the next run re-ranks
        let memory = match source.last_successful_method {
            Some(m) if tried.contains(&m) => MemoryUpdate::Clear,
            _ => MemoryUpdate::Keep,
        };
        let last_method = tried
            .last()
            .copied()
            .or(source.last_method)
            .unwrap_or(ExtractionMethod::Html);
        let last_error = records.last().and_then(|r| r.error.clone());
        let update = PerformanceUpdate {
            outcome: RunOutcome::Failure,
            last_method,
            memory,
            execution_ms: execution_ms as i64,
            quality_metrics: serde_json::json!({
                "lastItems": 0,
                "lastAttempts": records.len(),
                "lastOutcome": "failure",
                "lastError": last_error,
            }),
        };
        self.write(source, update).await;
    }

    /// The store is synchronous SQLite; keep its wait off the runtime workers.
    async fn write(&self, source: &Source, update: PerformanceUpdate) {
        let store = Arc::clone(&self.store);
        let source_id = source.id.clone();
        let written =
            tokio::task::spawn_blocking(move || store.record_performance(&source_id, &update)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(source_id = %source.id, error = %e, "failed to record source performance")
            }
            Err(e) => {
                error!(source_id = %source.id, error = %e, "performance write task failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        calls: Mutex<Vec<ExtractionMethod>>,
        script: Mutex<VecDeque<Result<Vec<ContentItem>, ExtractError>>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<Vec<ContentItem>, ExtractError>>) -> Self {
            Self {
                calls: Mutex::new(vec![]),
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Extractor for Scripted {
        async fn extract(&self, req: &ExtractRequest) -> Result<Vec<ContentItem>, ExtractError> {
            self.calls.lock().unwrap().push(req.method);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ExtractError::Other("script exhausted".into())))
        }
        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<PerformanceUpdate>>,
    }

    impl PerformanceStore for Recorder {
        fn record_performance(&self, _: &str, u: &PerformanceUpdate) -> Result<(), PipelineError> {
            self.writes.lock().unwrap().push(u.clone());
            Ok(())
        }
    }

    use crate::error::PipelineError;

    fn item() -> ContentItem {
        ContentItem {
            url: "https://example.com/a".into(),
            title: "A".into(),
            body: String::new(),
            published_at: 0,
        }
    }

    fn setup(
        script: Vec<Result<Vec<ContentItem>, ExtractError>>,
    ) -> (Executor, Arc<Scripted>, Arc<Recorder>) {
        let ex = Arc::new(Scripted::new(script));
        let rec = Arc::new(Recorder::default());
        let exec = Executor::new(ex.clone(), rec.clone(), ExecutorPolicy::default());
        (exec, ex, rec)
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_stops_and_sets_memory() {
        let (exec, ex, rec) = setup(vec![Ok(vec![item()])]);
        let src = Source::new("s", "t", "https://example.com/rss");
        let out = exec
            .execute(&src, &[ExtractionMethod::Rss, ExtractionMethod::Html])
            .await
            .unwrap();
        assert_eq!(out.method, ExtractionMethod::Rss);
        assert_eq!(ex.calls.lock().unwrap().len(), 1);
        let writes = rec.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].memory, MemoryUpdate::Set(ExtractionMethod::Rss));
        assert_eq!(writes[0].outcome, RunOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_is_a_content_failure() {
        let (exec, ex, _rec) = setup(vec![Ok(vec![]), Ok(vec![item()])]);
        let src = Source::new("s", "t", "https://example.com/rss");
        let t0 = Instant::now();
        let out = exec
            .execute(&src, &[ExtractionMethod::Rss, ExtractionMethod::Html])
            .await
            .unwrap();
        assert_eq!(out.method, ExtractionMethod::Html);
        assert_eq!(ex.calls.lock().unwrap().len(), 2);
        // content failures are not retryable: no backoff
        assert_eq!(t0.elapsed(), Duration::ZERO);
        assert_eq!(out.attempts[0].delay_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_lists_every_method_and_lowers_rate() {
        let (exec, _ex, rec) = setup(vec![
            Err(ExtractError::Parse("bad xml".into())),
            Err(ExtractError::Status {
                status: 403,
                message: "forbidden".into(),
            }),
        ]);
        let mut src = Source::new("s", "t", "https://example.com/rss");
        src.last_successful_method = Some(ExtractionMethod::Rss);
        let err = exec
            .execute(&src, &[ExtractionMethod::Rss, ExtractionMethod::Html])
            .await
            .unwrap_err();
        assert_eq!(
            err.methods_tried,
            vec![ExtractionMethod::Rss, ExtractionMethod::Html]
        );
        let msg = err.to_string();
        assert!(msg.contains("rss") && msg.contains("html"), "{msg}");
        let writes = rec.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].outcome, RunOutcome::Failure);
        assert_eq!(writes[0].memory, MemoryUpdate::Clear);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_extractor_times_out_as_transport() {
        struct Slow;
        #[async_trait::async_trait]
        impl Extractor for Slow {
            async fn extract(&self, _: &ExtractRequest) -> Result<Vec<ContentItem>, ExtractError> {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(vec![])
            }
            fn name(&self) -> &'static str {
                "slow"
            }
        }
        let rec = Arc::new(Recorder::default());
        let exec = Executor::new(Arc::new(Slow), rec, ExecutorPolicy::default());
        let src = Source::new("s", "t", "https://example.com/");
        let err = exec
            .execute(&src, &[ExtractionMethod::Html])
            .await
            .unwrap_err();
        let class = err.attempts[0].classification.clone().unwrap();
        assert_eq!(class.category, crate::ingest::classify::ErrorCategory::Transport);
        assert!(class.retryable);
    }
}
