//! One-shot runner for cron-style schedulers: run acquisition, the queue, or
//! both once and print the result JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use content_pipeline::config::PipelineConfig;
use content_pipeline::ingest::methods::ExtractionMethod;
use content_pipeline::ingest::runner::AcquireRequest;
use content_pipeline::queue::manager::QueueRequest;
use content_pipeline::queue::JobKind;
use content_pipeline::telemetry;
use content_pipeline::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "pipeline-run", about = "Run one acquisition and/or queue batch")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Acquire from one source, or the next due batch.
    Acquire {
        #[arg(long)]
        source_id: Option<String>,
        /// rss | cms_api | html | browser
        #[arg(long)]
        method: Option<ExtractionMethod>,
    },
    /// Process one batch of the job queue.
    Queue {
        #[arg(long)]
        batch_size: Option<usize>,
        /// generate_slides | regenerate_slides
        #[arg(long)]
        job_type: Option<JobKind>,
    },
    /// Acquire the due batch, then process the queue.
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();
    let cfg = PipelineConfig::load().context("loading configuration")?;
    let pipeline = Pipeline::from_config(&cfg)?;

    let out = match cli.cmd {
        Cmd::Acquire { source_id, method } => {
            let req = AcquireRequest {
                source_id,
                forced_method: method,
            };
            let reports = pipeline.runner.run(&req).await?;
            json!({ "success": true, "results": reports })
        }
        Cmd::Queue {
            batch_size,
            job_type,
        } => {
            let req = QueueRequest {
                batch_size,
                job_type,
            };
            serde_json::to_value(pipeline.queue.process_batch(&req).await?)?
        }
        Cmd::All => {
            let acquired = pipeline.runner.run(&AcquireRequest::default()).await?;
            let queued = pipeline.queue.process_batch(&QueueRequest::default()).await?;
            json!({ "success": true, "acquire": acquired, "queue": queued })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
