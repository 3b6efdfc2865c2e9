//! Content pipeline service: binary entrypoint.
//! Loads configuration once, wires the pipeline, starts the optional in-process
//! triggers and serves the HTTP trigger surface.

use anyhow::Context;
use tracing::info;

use content_pipeline::api::{self, AppState};
use content_pipeline::config::PipelineConfig;
use content_pipeline::ingest::scheduler;
use content_pipeline::metrics::Metrics;
use content_pipeline::telemetry;
use content_pipeline::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    // Missing secrets end the process here, before anything is served.
    let cfg = PipelineConfig::load().context("loading configuration")?;
    info!(secrets = ?cfg.secrets, bind = %cfg.bind_addr, "configuration loaded");

    let metrics = Metrics::install().context("installing prometheus recorder")?;
    let pipeline = Pipeline::from_config(&cfg)?;

    let sched = cfg.tunables.scheduler;
    let _acquire_task = scheduler::spawn_acquisition(sched, pipeline.runner.clone());
    let _queue_task = scheduler::spawn_queue(sched, pipeline.queue.clone());

    let app = api::router(AppState { pipeline }, &metrics);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr.as_str())
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "listening");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
