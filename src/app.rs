//! Component wiring: build every collaborator once from [`PipelineConfig`].

use anyhow::Context;
use std::sync::Arc;

use crate::approval::ApprovalGate;
use crate::config::{PipelineConfig, Tunables};
use crate::ingest::providers::MethodRouter;
use crate::ingest::runner::AcquisitionRunner;
use crate::ingest::types::Extractor;
use crate::queue::generator::{Generator, HttpGenerator};
use crate::queue::manager::QueueManager;
use crate::store::Store;

/// The two periodic units of work plus the store they share.
#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<Store>,
    pub runner: Arc<AcquisitionRunner>,
    pub queue: Arc<QueueManager>,
}

impl Pipeline {
    /// Production wiring from config: SQLite file, HTTP extractors, HTTP generator.
    pub fn from_config(cfg: &PipelineConfig) -> anyhow::Result<Self> {
        let store = Store::open(&cfg.secrets.database_path).with_context(|| {
            format!(
                "opening datastore at {}",
                cfg.secrets.database_path.display()
            )
        })?;

        let extractor = MethodRouter::from_secrets(
            &cfg.secrets,
            cfg.tunables.acquisition.extract_timeout(),
        )
        .context("building extractor clients")?;

        let generator = HttpGenerator::new(
            &cfg.secrets.generator_base_url,
            &cfg.secrets.generator_api_key,
            cfg.tunables.queue.generate_timeout(),
        )
        .context("building generator client")?;

        Ok(Self::assemble(
            Arc::new(store),
            Arc::new(extractor),
            Arc::new(generator),
            &cfg.tunables,
        ))
    }

    /// Wire already-built collaborators; tests use this with fakes.
    pub fn assemble(
        store: Arc<Store>,
        extractor: Arc<dyn Extractor>,
        generator: Arc<dyn Generator>,
        tunables: &Tunables,
    ) -> Self {
        let runner = AcquisitionRunner::new(store.clone(), extractor, tunables.clone());
        let queue = QueueManager::new(
            store.clone(),
            generator,
            ApprovalGate::new(tunables.approval.default_threshold),
            tunables.queue.clone(),
        );
        Self {
            store,
            runner: Arc::new(runner),
            queue: Arc::new(queue),
        }
    }
}
