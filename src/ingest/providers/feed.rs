// src/ingest/providers/feed.rs
use async_trait::async_trait;
use chrono::DateTime;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::normalize_text;
use crate::ingest::types::{ContentItem, ExtractError, ExtractRequest, Extractor};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> i64 {
    DateTime::parse_from_rfc2822(ts.trim())
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

/// Parse an RSS 2.0 document into content items.
///
/// Items without a link (or guid URL) or without any text are dropped.
pub fn parse_feed(xml: &str) -> Result<Vec<ContentItem>, ExtractError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| ExtractError::Parse(e.to_string()))?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let url = match it
            .link
            .or(it.guid.filter(|g| g.starts_with("http")))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
        {
            Some(u) => u,
            None => continue,
        };
        let title = normalize_text(it.title.as_deref().unwrap_or_default());
        let body = normalize_text(it.description.as_deref().unwrap_or_default());
        if title.is_empty() && body.is_empty() {
            continue;
        }
        out.push(ContentItem {
            url,
            title,
            body,
            published_at: it.pub_date.as_deref().map(parse_rfc2822_to_unix).unwrap_or(0),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_items_total").increment(out.len() as u64);
    Ok(out)
}

/// Fetches the source address and reads it as an RSS feed.
pub struct FeedExtractor {
    client: reqwest::Client,
}

impl FeedExtractor {
    pub fn new(timeout: Duration) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .user_agent("content-pipeline/0.1 (feed reader)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Extractor for FeedExtractor {
    async fn extract(&self, req: &ExtractRequest) -> Result<Vec<ContentItem>, ExtractError> {
        let resp = self.client.get(&req.address).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ExtractError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("feed fetch failed").to_string(),
            });
        }
        let body = resp.text().await?;
        parse_feed(&body)
    }

    fn name(&self) -> &'static str {
        "feed"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
