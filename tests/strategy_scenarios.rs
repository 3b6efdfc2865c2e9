// tests/strategy_scenarios.rs
// Strategy selection against history kept in a real store.

use content_pipeline::ingest::methods::ExtractionMethod::{self, *};
use content_pipeline::ingest::strategy::{self, MethodHistory, SelectionReason, REMEMBERED_CONFIDENCE};
use content_pipeline::models::Source;
use content_pipeline::Store;

fn record(store: &Store, id: &str, method: ExtractionMethod, rate: f64) {
    store
        .upsert_source(&Source {
            last_method: Some(method),
            success_rate: rate,
            ..Source::new(id, "t1", format!("https://{id}.example/"))
        })
        .unwrap();
}

#[test]
fn scenario_a_feed_url_with_history_picks_rss() {
    let store = Store::open_in_memory().unwrap();
    record(&store, "h1", Rss, 90.0);
    record(&store, "h2", Html, 60.0);

    let history = store.method_history().unwrap();
    assert_eq!(history.get(&Rss), Some(&90.0));

    let source = Source::new("s1", "t1", "https://news.example.com/rss");
    let st = strategy::select(&source, None, None, &history);
    assert_eq!(st.method, Rss);
    assert_eq!(st.fallback_chain, vec![Html, Browser]);
    assert!((st.confidence - 0.9).abs() < 1e-9);
    assert!(matches!(
        st.reason,
        SelectionReason::Ranked {
            from_history: true,
            url_match: true,
            ..
        }
    ));
}

#[test]
fn scenario_b_remembered_method_ignores_history() {
    let mut history = MethodHistory::new();
    history.insert(Rss, 99.0);
    history.insert(Html, 5.0);

    let mut source = Source::new("s1", "t1", "https://news.example.com/rss");
    source.last_successful_method = Some(Html);

    let st = strategy::select(&source, None, None, &history);
    assert_eq!(st.method, Html);
    assert_eq!(st.confidence, REMEMBERED_CONFIDENCE);
    assert_eq!(st.reason, SelectionReason::Remembered);
    assert_eq!(st.method_chain(), vec![Html, Browser, Rss]);
}

#[test]
fn plain_article_url_never_starts_with_rss() {
    let mut history = MethodHistory::new();
    history.insert(Rss, 100.0);
    let source = Source::new("s1", "t1", "https://example.com/world/2025/story");
    let st = strategy::select(&source, None, None, &history);
    assert_ne!(st.method, Rss);
}
