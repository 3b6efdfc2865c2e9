//! # Method Registry
//! Static knowledge of the extraction methods: names, tie-break priority,
//! prior success rate (used when no history exists), the URL markers that make
//! a method eligible, and each method's fallback chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// RSS/Atom feed parsing.
    Rss,
    /// Structured JSON API exposed by a modern CMS (WordPress, Ghost, ...).
    CmsApi,
    /// Generic HTML article extraction.
    Html,
    /// Headless-browser rendering for script-heavy pages.
    Browser,
}

impl ExtractionMethod {
    pub const ALL: [ExtractionMethod; 4] = [
        ExtractionMethod::Rss,
        ExtractionMethod::CmsApi,
        ExtractionMethod::Html,
        ExtractionMethod::Browser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Rss => "rss",
            ExtractionMethod::CmsApi => "cms_api",
            ExtractionMethod::Html => "html",
            ExtractionMethod::Browser => "browser",
        }
    }

    /// Lower number wins ties.
    pub fn priority(&self) -> u8 {
        match self {
            ExtractionMethod::Rss => 1,
            ExtractionMethod::CmsApi => 2,
            ExtractionMethod::Html => 3,
            ExtractionMethod::Browser => 4,
        }
    }

    /// Success rate assumed when no source has history for this method.
    pub fn prior_success_rate(&self) -> f64 {
        match self {
            ExtractionMethod::Rss => 85.0,
            ExtractionMethod::CmsApi => 80.0,
            ExtractionMethod::Html => 70.0,
            ExtractionMethod::Browser => 60.0,
        }
    }

    /// Alternatives tried, in order, once this method is exhausted.
    pub fn fallback_chain(&self) -> &'static [ExtractionMethod] {
        use ExtractionMethod::*;
        match self {
            Rss => &[Html, Browser],
            CmsApi => &[Rss, Html],
            Html => &[Browser, Rss],
            Browser => &[Html],
        }
    }

    /// URL markers required for eligibility. Empty means always eligible.
    fn url_markers(&self) -> &'static [&'static str] {
        match self {
            ExtractionMethod::Rss => &["/rss", "/feed", "rss.", ".rss", ".xml", "atom", "feeds."],
            ExtractionMethod::CmsApi => &["/wp-json", "wordpress", "/ghost/", "ghost.io", "/api/"],
            ExtractionMethod::Html | ExtractionMethod::Browser => &[],
        }
    }

    /// Whether the URL-pattern heuristic admits this method for `address`.
    pub fn is_eligible_for(&self, address: &str) -> bool {
        let markers = self.url_markers();
        if markers.is_empty() {
            return true;
        }
        let addr = address.to_ascii_lowercase();
        markers.iter().any(|m| addr.contains(m))
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown extraction method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for ExtractionMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        match norm.as_str() {
            "rss" | "feed" | "atom" => Ok(ExtractionMethod::Rss),
            "cms_api" | "api" | "wordpress" => Ok(ExtractionMethod::CmsApi),
            "html" | "generic_html" => Ok(ExtractionMethod::Html),
            "browser" | "headless" => Ok(ExtractionMethod::Browser),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}
