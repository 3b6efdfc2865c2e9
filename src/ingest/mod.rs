// src/ingest/mod.rs
//! Source acquisition: method registry, strategy selection, the executor that
//! walks a method chain, and the runner that turns results into queued jobs.

pub mod classify;
pub mod executor;
pub mod methods;
pub mod performance;
pub mod providers;
pub mod runner;
pub mod scheduler;
pub mod strategy;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

/// Longest text kept for a single title or body.
pub const MAX_TEXT_CHARS: usize = 8000;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_metrics);
}

fn describe_metrics() {
    describe_counter!(
        "acquisition_attempts_total",
        "Extractor calls, labelled by method."
    );
    describe_counter!(
        "acquisition_failures_total",
        "Failed extractor calls, labelled by error category."
    );
    describe_counter!(
        "acquisition_runs_total",
        "Per-source acquisition runs, labelled by outcome."
    );
    describe_histogram!(
        "acquisition_duration_ms",
        "Wall time of one per-source acquisition run in milliseconds."
    );
    describe_counter!(
        "acquisition_items_imported_total",
        "Content items inserted (after URL dedup)."
    );
    describe_gauge!(
        "acquisition_last_run_ts",
        "Unix ts when an acquisition batch last ran."
    );
    describe_histogram!("feed_parse_ms", "Time spent parsing one fetched feed in milliseconds.");
    describe_counter!("feed_items_total", "Items parsed out of fetched feeds.");
    describe_counter!(
        "scheduler_ticks_total",
        "In-process scheduler firings, labelled by trigger."
    );
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("valid regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Normalize extracted text: decode entities, strip tags, fold typographic
/// quotes to ASCII, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let out = RE_WS.replace_all(&quoted, " ");
    let out = out.trim();

    if out.chars().count() > MAX_TEXT_CHARS {
        out.chars().take(MAX_TEXT_CHARS).collect()
    } else {
        out.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{counter, histogram};
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn every_recorded_ingest_series_has_help_text() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            histogram!("feed_parse_ms").record(3.0);
            counter!("feed_items_total").increment(2);
            counter!("scheduler_ticks_total", "trigger" => "acquire").increment(1);
            counter!("acquisition_items_imported_total").increment(2);
        });
        let page = handle.render();
        for name in [
            "feed_parse_ms",
            "feed_items_total",
            "scheduler_ticks_total",
            "acquisition_items_imported_total",
        ] {
            assert!(page.contains(&format!("# HELP {name} ")), "{name} missing from\n{page}");
        }
    }

    #[test]
    fn normalize_text_collapses_ws_and_decodes() {
        let s = "  Hello,&nbsp;&nbsp; world!  ";
        assert_eq!(normalize_text(s), "Hello, world!");
    }

    #[test]
    fn tags_become_word_breaks() {
        assert_eq!(normalize_text("<p>one</p><p>two</p>"), "one two");
        assert_eq!(normalize_text("\u{201C}quoted\u{201D}"), "\"quoted\"");
    }

    #[test]
    fn long_text_is_capped() {
        let long = "a".repeat(MAX_TEXT_CHARS + 10);
        assert_eq!(normalize_text(&long).chars().count(), MAX_TEXT_CHARS);
    }
}
