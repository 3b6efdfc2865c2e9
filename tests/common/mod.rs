// tests/common/mod.rs
// Shared fakes for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

use content_pipeline::ingest::methods::ExtractionMethod;
use content_pipeline::ingest::types::{ContentItem, ExtractError, ExtractRequest, Extractor};
use content_pipeline::queue::generator::{
    GenerateError, GeneratedStory, GenerationRequest, Generator,
};
use content_pipeline::queue::{Job, JobParams, SlideOptions};
use content_pipeline::Store;

pub fn item(url: &str) -> ContentItem {
    ContentItem {
        url: url.to_string(),
        title: format!("Title for {url}"),
        body: "body".to_string(),
        published_at: 1_700_000_000,
    }
}

/// Extractor that replays a fixed script and records every call.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<Vec<ContentItem>, ExtractError>>>,
    calls: Mutex<Vec<(ExtractionMethod, Instant)>>,
}

impl ScriptedExtractor {
    pub fn new(script: Vec<Result<Vec<ContentItem>, ExtractError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(ExtractionMethod, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<ExtractionMethod> {
        self.calls().into_iter().map(|(m, _)| m).collect()
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, req: &ExtractRequest) -> Result<Vec<ContentItem>, ExtractError> {
        self.calls.lock().unwrap().push((req.method, Instant::now()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExtractError::Other("script exhausted".into())))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Generator that replays a fixed script and counts calls.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<GeneratedStory, GenerateError>>>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<GeneratedStory, GenerateError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, req: &GenerationRequest) -> Result<GeneratedStory, GenerateError> {
        self.calls.lock().unwrap().push(req.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerateError::Rejected("script exhausted".into())))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn story(id: &str, slides: u32, score: Option<f64>) -> GeneratedStory {
    GeneratedStory {
        story_id: id.to_string(),
        slide_count: slides,
        quality_score: score,
    }
}

/// Insert one content item for `source_id` and queue its generation job.
pub fn seed_job(store: &Store, source_id: &str, url: &str, now: DateTime<Utc>) -> Job {
    store
        .insert_content_items(source_id, &[item(url)], now)
        .unwrap();
    store
        .enqueue_new_content(source_id, &JobParams::generate(SlideOptions::default()), 3, now)
        .unwrap()
        .remove(0)
}
