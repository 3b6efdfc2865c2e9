//! Acquisition runner: resolve sources, select a strategy, execute it, store
//! what came back and queue one generation job per new content item.

use chrono::Utc;
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Tunables;
use crate::error::Result;
use crate::ingest::executor::{Executor, ExecutorPolicy};
use crate::ingest::methods::ExtractionMethod;
use crate::ingest::strategy::{self, Strategy};
use crate::ingest::types::Extractor;
use crate::models::Source;
use crate::queue::{JobParams, SlideOptions};
use crate::store::Store;

/// Run-scoping parameters accepted by the acquisition trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcquireRequest {
    pub source_id: Option<String>,
    pub forced_method: Option<ExtractionMethod>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub success: bool,
    pub source_id: String,
    pub articles_imported: usize,
    pub jobs_queued: usize,
    pub method_used: ExtractionMethod,
    pub attempts_made: usize,
    pub execution_ms: u64,
    pub strategy_info: Strategy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_made: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_ms: Option<u64>,
}

/// Acquisition result for one source, as returned to the trigger caller.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AcquisitionReport {
    Imported(ImportSummary),
    Failed(FailureSummary),
}

impl AcquisitionReport {
    pub fn failed(source_id: Option<&str>, error: impl Into<String>) -> Self {
        AcquisitionReport::Failed(FailureSummary {
            success: false,
            source_id: source_id.map(str::to_string),
            error: error.into(),
            attempts_made: None,
            execution_ms: None,
        })
    }

    pub fn success(&self) -> bool {
        matches!(self, AcquisitionReport::Imported(_))
    }
}

pub struct AcquisitionRunner {
    store: Arc<Store>,
    executor: Executor,
    tunables: Tunables,
    job_params: JobParams,
}

impl AcquisitionRunner {
    pub fn new(store: Arc<Store>, extractor: Arc<dyn Extractor>, tunables: Tunables) -> Self {
        super::ensure_metrics_described();
        let policy = ExecutorPolicy::from(&tunables.acquisition);
        let executor = Executor::new(extractor, store.clone(), policy);
        Self {
            store,
            executor,
            tunables,
            job_params: JobParams::generate(SlideOptions::default()),
        }
    }

    /// Parameters stamped on every job this runner enqueues.
    pub fn with_job_options(mut self, options: SlideOptions) -> Self {
        self.job_params = JobParams::generate(options);
        self
    }

    /// Run one named source, or the next due batch when none is named.
    pub async fn run(&self, req: &AcquireRequest) -> Result<Vec<AcquisitionReport>> {
        match req.source_id.as_deref() {
            Some(id) => Ok(vec![self.run_source(id, req.forced_method).await?]),
            None => self.run_due(req.forced_method).await,
        }
    }

    pub async fn run_source(
        &self,
        source_id: &str,
        forced: Option<ExtractionMethod>,
    ) -> Result<AcquisitionReport> {
        let id = source_id.to_string();
        let Some(source) = self.store.call(move |store| store.get_source(&id)).await? else {
            return Ok(AcquisitionReport::failed(
                Some(source_id),
                format!("source {source_id} not found"),
            ));
        };
        if !source.active {
            return Ok(AcquisitionReport::failed(
                Some(source_id),
                format!("source {source_id} is inactive"),
            ));
        }
        self.acquire(&source, forced).await
    }

    /// Least recently run active sources first, one after another.
    ///
    /// A datastore failure while storing one source's items is reported for
    /// that source; the rest of the batch still runs.
    pub async fn run_due(&self, forced: Option<ExtractionMethod>) -> Result<Vec<AcquisitionReport>> {
        let limit = self.tunables.acquisition.source_batch_size;
        let sources = self.store.call(move |store| store.due_sources(limit)).await?;
        let mut reports = Vec::with_capacity(sources.len());
        for source in &sources {
            if !reports.is_empty() {
                tokio::time::sleep(self.tunables.acquisition.inter_source_delay()).await;
            }
            let report = match self.acquire(source, forced).await {
                Ok(r) => r,
                Err(e) => {
                    error!(source_id = %source.id, error = %e, "storing acquired items failed");
                    AcquisitionReport::failed(Some(&source.id), e.to_string())
                }
            };
            reports.push(report);
        }
        gauge!("acquisition_last_run_ts").set(Utc::now().timestamp() as f64);
        info!(
            sources = reports.len(),
            succeeded = reports.iter().filter(|r| r.success()).count(),
            "acquisition batch finished"
        );
        Ok(reports)
    }

    async fn acquire(
        &self,
        source: &Source,
        forced: Option<ExtractionMethod>,
    ) -> Result<AcquisitionReport> {
        let history = self.store.call(|store| store.method_history()).await?;
        let strategy = strategy::select(source, forced, None, &history);
        info!(
            source_id = %source.id,
            method = %strategy.method,
            confidence = strategy.confidence,
            reason = ?strategy.reason,
            "strategy selected"
        );

        match self.executor.execute(source, &strategy.method_chain()).await {
            Ok(done) => {
                let now = Utc::now();
                let extracted = done.items.len();
                let (source_id, items) = (source.id.clone(), done.items);
                let params = self.job_params.clone();
                let max_attempts = self.tunables.queue.default_max_attempts;
                let (inserted, jobs) = self
                    .store
                    .call(move |store| {
                        let inserted = store.insert_content_items(&source_id, &items, now)?;
                        let jobs = store.enqueue_new_content(&source_id, &params, max_attempts, now)?;
                        Ok((inserted, jobs))
                    })
                    .await?;
                counter!("acquisition_items_imported_total").increment(inserted.len() as u64);
                info!(
                    source_id = %source.id,
                    method = %done.method,
                    extracted,
                    imported = inserted.len(),
                    jobs = jobs.len(),
                    "source acquired"
                );
                Ok(AcquisitionReport::Imported(ImportSummary {
                    success: true,
                    source_id: source.id.clone(),
                    articles_imported: inserted.len(),
                    jobs_queued: jobs.len(),
                    method_used: done.method,
                    attempts_made: done.attempts.len(),
                    execution_ms: done.execution_ms,
                    strategy_info: strategy,
                }))
            }
            Err(failure) => {
                warn!(source_id = %source.id, error = %failure, "source acquisition failed");
                Ok(AcquisitionReport::Failed(FailureSummary {
                    success: false,
                    source_id: Some(source.id.clone()),
                    error: failure.to_string(),
                    attempts_made: Some(failure.attempts.len()),
                    execution_ms: Some(failure.execution_ms),
                }))
            }
        }
    }
}
