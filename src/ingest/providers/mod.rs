// src/ingest/providers/mod.rs
pub mod feed;
pub mod remote;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Secrets;
use crate::ingest::methods::ExtractionMethod;
use crate::ingest::types::{ContentItem, ExtractError, ExtractRequest, Extractor};

pub use feed::FeedExtractor;
pub use remote::RemoteExtractor;

/// Dispatches each request to the extractor registered for its method.
#[derive(Clone, Default)]
pub struct MethodRouter {
    routes: HashMap<ExtractionMethod, Arc<dyn Extractor>>,
}

impl MethodRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, method: ExtractionMethod, extractor: Arc<dyn Extractor>) -> Self {
        self.routes.insert(method, extractor);
        self
    }

    /// Production wiring: feeds are read locally, everything else goes to the
    /// extraction service.
    pub fn from_secrets(
        secrets: &Secrets,
        timeout: std::time::Duration,
    ) -> Result<Self, ExtractError> {
        let feed: Arc<dyn Extractor> = Arc::new(FeedExtractor::new(timeout)?);
        let remote: Arc<dyn Extractor> = Arc::new(RemoteExtractor::new(
            &secrets.extractor_base_url,
            &secrets.extractor_api_key,
            timeout,
        )?);
        Ok(Self::new()
            .with(ExtractionMethod::Rss, feed)
            .with(ExtractionMethod::CmsApi, remote.clone())
            .with(ExtractionMethod::Html, remote.clone())
            .with(ExtractionMethod::Browser, remote))
    }
}

#[async_trait]
impl Extractor for MethodRouter {
    async fn extract(&self, req: &ExtractRequest) -> Result<Vec<ContentItem>, ExtractError> {
        match self.routes.get(&req.method) {
            Some(ex) => ex.extract(req).await,
            None => Err(ExtractError::Other(format!(
                "no extractor registered for method {}",
                req.method
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "router"
    }
}
