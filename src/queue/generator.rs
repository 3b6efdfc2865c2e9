//! External content generator: turns a content item into a slide story.
//!
//! A response carrying `success: false` is treated exactly like a transport
//! error; callers only ever see `Ok(GeneratedStory)` or `Err(GenerateError)`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::ingest::types::with_causes;
use crate::queue::JobParams;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub job_id: String,
    pub content_id: String,
    #[serde(flatten)]
    pub params: JobParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedStory {
    pub story_id: String,
    pub slide_count: u32,
    #[serde(default)]
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("generator rejected job: {0}")]
    Rejected(String),
    #[error("generator HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("generator timed out after {0}s")]
    Timeout(u64),
    #[error("generator transport error: {0}")]
    Transport(String),
    #[error("generator response unreadable: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GenerateError {
    fn from(e: reqwest::Error) -> Self {
        let message = with_causes(&e);
        if e.is_decode() {
            GenerateError::Decode(message)
        } else {
            GenerateError::Transport(message)
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, req: &GenerationRequest) -> Result<GeneratedStory, GenerateError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    success: bool,
    story_id: Option<String>,
    #[serde(default)]
    slide_count: Option<u32>,
    #[serde(default)]
    quality_score: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

impl GenerateResponse {
    fn into_story(self) -> Result<GeneratedStory, GenerateError> {
        if !self.success {
            return Err(GenerateError::Rejected(
                self.error.unwrap_or_else(|| "success=false".to_string()),
            ));
        }
        let story_id = self
            .story_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GenerateError::Decode("missing storyId".to_string()))?;
        Ok(GeneratedStory {
            story_id,
            slide_count: self.slide_count.unwrap_or(0),
            quality_score: self.quality_score.filter(|q| q.is_finite()),
        })
    }
}

/// HTTP client for the generator service (`POST {base}/generate`).
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpGenerator {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .user_agent("content-pipeline/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/generate", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, req: &GenerationRequest) -> Result<GeneratedStory, GenerateError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerateError::Status {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        let parsed: GenerateResponse = resp.json().await?;
        parsed.into_story()
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
