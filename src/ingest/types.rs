// src/ingest/types.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::methods::ExtractionMethod;

/// A normalized article produced by an extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// unix seconds; 0 when the source gave no usable date
    #[serde(default)]
    pub published_at: i64,
}

/// What an extractor is told about the source it should read.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub address: String,
    pub source_id: String,
    pub region: Option<String>,
    pub topic_id: Option<String>,
    pub method: ExtractionMethod,
}

/// Raw extractor failure. The message text is what the classifier inspects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request timeout after {0}s")]
    Timeout(u64),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("parse failure: {0}")]
    Parse(String),
    #[error("no content extracted")]
    Empty,
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        let message = with_causes(&e);
        if e.is_timeout() {
            return ExtractError::Transport(format!("timeout: {message}"));
        }
        if let Some(status) = e.status() {
            return ExtractError::Status {
                status: status.as_u16(),
                message,
            };
        }
        if e.is_decode() {
            return ExtractError::Parse(message);
        }
        ExtractError::Transport(message)
    }
}

/// Render an error followed by each of its causes, `outer: inner: root`.
///
/// reqwest's own message stops at "error sending request"; the TLS or socket
/// failure the classifier needs lives further down the chain.
pub(crate) fn with_causes(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut next = err.source();
    while let Some(cause) = next {
        let text = cause.to_string();
        if !text.is_empty() && !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        next = cause.source();
    }
    out
}

/// External extractor collaborator: turns a source address into items.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, req: &ExtractRequest) -> Result<Vec<ContentItem>, ExtractError>;
    fn name(&self) -> &'static str;
}
