//! Error types for the pipeline library.
//!
//! Binaries and startup code wrap these in `anyhow` with context; the library
//! itself keeps them typed so callers can match on transitions and config.

use thiserror::Error;

use crate::queue::JobStatus;

/// Errors raised while loading [`crate::config::PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set (or empty).
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    /// `PIPELINE_CONFIG_PATH` points somewhere that does not exist.
    #[error("config path {0} does not exist")]
    MissingFile(String),

    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised by the datastore and the job state machine.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("datastore error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A conditional update matched no row because the job was not in `from`.
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The datastore lock was poisoned by a panicking writer.
    #[error("datastore lock poisoned")]
    Poisoned,

    /// A datastore call on the blocking pool panicked or was cancelled.
    #[error("datastore task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
