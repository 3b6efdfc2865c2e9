// src/ingest/providers/remote.rs
//! Client for the external extraction service used by the non-feed methods.
//!
//! `POST {base}/extract` with a bearer key and the extract request; the body
//! is either `{ "items": [...] }` or `{ "error": "..." }`. Extra fields are
//! dropped here and never travel further in.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::normalize_text;
use crate::ingest::types::{ContentItem, ExtractError, ExtractRequest, Extractor};

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(alias = "link")]
    url: Option<String>,
    title: Option<String>,
    #[serde(default, alias = "content", alias = "description")]
    body: Option<String>,
    #[serde(default, alias = "publishedAt")]
    published_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExtractResponse {
    Items {
        #[serde(alias = "articles")]
        items: Vec<RawItem>,
    },
    Failure {
        error: String,
    },
}

pub struct RemoteExtractor {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RemoteExtractor {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .user_agent("content-pipeline/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/extract", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }
}

/// Convert a boundary response into items or an extractor error.
fn into_items(body: &str) -> Result<Vec<ContentItem>, ExtractError> {
    let parsed: ExtractResponse =
        serde_json::from_str(body).map_err(|e| ExtractError::Parse(e.to_string()))?;
    match parsed {
        ExtractResponse::Failure { error } => Err(ExtractError::Other(error)),
        ExtractResponse::Items { items } => Ok(items
            .into_iter()
            .filter_map(|raw| {
                let url = raw.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())?;
                let title = normalize_text(raw.title.as_deref().unwrap_or_default());
                let body = normalize_text(raw.body.as_deref().unwrap_or_default());
                if title.is_empty() && body.is_empty() {
                    return None;
                }
                Some(ContentItem {
                    url,
                    title,
                    body,
                    published_at: raw.published_at.unwrap_or(0).max(0),
                })
            })
            .collect()),
    }
}

#[async_trait]
impl Extractor for RemoteExtractor {
    async fn extract(&self, req: &ExtractRequest) -> Result<Vec<ContentItem>, ExtractError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return Err(ExtractError::Status {
                status: status.as_u16(),
                message: snippet,
            });
        }
        into_items(&body)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_shape_is_normalized() {
        let body = r#"{"items":[
            {"url":"https://e.com/1","title":"  Hello   world ","content":"<b>x</b>","publishedAt":1700000000,"extra":true},
            {"title":"no url"},
            {"link":"https://e.com/2","title":"Two"}
        ],"meta":{"took":3}}"#;
        let items = into_items(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Hello world");
        assert_eq!(items[0].body, "x");
        assert_eq!(items[0].published_at, 1_700_000_000);
        assert_eq!(items[1].url, "https://e.com/2");
    }

    #[test]
    fn error_shape_becomes_extract_error() {
        let err = into_items(r#"{"error":"no content extracted from page"}"#).unwrap_err();
        assert_eq!(
            err,
            ExtractError::Other("no content extracted from page".into())
        );
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(into_items("<html>"), Err(ExtractError::Parse(_))));
    }
}
