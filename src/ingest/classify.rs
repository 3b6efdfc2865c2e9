//! # Error Classifier
//! Maps a raw extraction failure onto the transport / site / content / method
//! taxonomy. Pure and deterministic: the same message text always yields the
//! same classification.
//!
//! Rules are checked in order and the first match wins:
//! 1. timeout, connection reset, HTTP 502/503/520 → transport, medium, retryable
//! 2. TLS / certificate failure → transport, high, not retryable
//! 3. HTTP 401/403/404 → site, high, not retryable
//! 4. nothing extracted / parse failure → content, medium, not retryable
//! 5. anything else → method, medium, retryable

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::ingest::types::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Transport,
    Site,
    Content,
    Method,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transport => "transport",
            ErrorCategory::Site => "site",
            ErrorCategory::Content => "content",
            ErrorCategory::Method => "method",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub retryable: bool,
    pub suggested_fix: String,
}

impl ErrorClassification {
    fn new(category: ErrorCategory, severity: Severity, retryable: bool, fix: &str) -> Self {
        Self {
            category,
            severity,
            retryable,
            suggested_fix: fix.to_string(),
        }
    }
}

static RE_TRANSIENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)time[ds]?[ _-]?out|connection reset|econnreset|\b(502|503|520)\b")
        .expect("transient regex")
});
static RE_TLS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(tls|ssl)\b|certificate|cert_|handshake|corrupt message|invalidcontenttype|unknownissuer|peer is incompatible|peer misbehaved|fatal alert",
    )
    .expect("tls regex")
});
static RE_SITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(401|403|404)\b").expect("site regex"));
static RE_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)no (content|items|articles)( were)? (extracted|found)|\bpars(e|ing)\b|empty (feed|response|document)")
        .expect("content regex")
});

/// Classify a failure by its message text.
pub fn classify_message(message: &str) -> ErrorClassification {
    use ErrorCategory::*;

    if RE_TRANSIENT.is_match(message) {
        return ErrorClassification::new(
            Transport,
            Severity::Medium,
            true,
            "transient network failure; retry after backoff",
        );
    }
    if RE_TLS.is_match(message) {
        return ErrorClassification::new(
            Transport,
            Severity::High,
            false,
            "TLS/certificate failure; switch to a method that fetches through a different client",
        );
    }
    if RE_SITE.is_match(message) {
        return ErrorClassification::new(
            Site,
            Severity::High,
            false,
            "site rejected the request; check the source address or deactivate the source",
        );
    }
    if RE_CONTENT.is_match(message) {
        return ErrorClassification::new(
            Content,
            Severity::Medium,
            false,
            "nothing usable extracted; try a different extraction method",
        );
    }
    ErrorClassification::new(
        Method,
        Severity::Medium,
        true,
        "unclassified extraction failure; retry or fall back",
    )
}

/// Classify an extractor error through its rendered message.
pub fn classify(err: &ExtractError) -> ErrorClassification {
    classify_message(&err.to_string())
}
