// tests/executor_backoff.rs
// Executor timing and bookkeeping with tokio's paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use common::{item, ScriptedExtractor};
use content_pipeline::ingest::classify::ErrorCategory;
use content_pipeline::ingest::executor::{Executor, ExecutorPolicy};
use content_pipeline::ingest::methods::ExtractionMethod::*;
use content_pipeline::ingest::types::ExtractError;
use content_pipeline::models::Source;
use content_pipeline::Store;

fn setup(url: &str) -> (Arc<Store>, Source) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let source = Source::new("s1", "t1", url);
    store.upsert_source(&source).unwrap();
    (store, source)
}

fn reset() -> ExtractError {
    ExtractError::Transport("connection reset by peer".into())
}

#[tokio::test(start_paused = true)]
async fn retryable_failures_cap_at_three_attempts_with_doubling_delay() {
    let (store, source) = setup("https://example.com/rss");
    let ex = Arc::new(ScriptedExtractor::new(vec![Err(reset()), Err(reset()), Err(reset()), Err(reset())]));
    let exec = Executor::new(ex.clone(), store.clone(), ExecutorPolicy::default());

    let t0 = Instant::now();
    let failure = exec
        .execute(&source, &[Rss, Html, Browser, CmsApi])
        .await
        .unwrap_err();

    let calls = ex.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].1 - t0, Duration::ZERO);
    assert_eq!(calls[1].1 - calls[0].1, Duration::from_secs(1));
    assert_eq!(calls[2].1 - calls[1].1, Duration::from_secs(2));
    // no sleep after the last permitted attempt
    assert_eq!(t0.elapsed(), Duration::from_secs(3));

    assert_eq!(failure.methods_tried, vec![Rss, Html, Browser]);
    assert!(failure.to_string().contains("rss, html, browser"));
    let delays: Vec<u64> = failure.attempts.iter().map(|a| a.delay_ms).collect();
    assert_eq!(delays, vec![1_000, 2_000, 0]);

    let s = store.get_source("s1").unwrap().unwrap();
    assert!(s.success_rate < 50.0);
    assert_eq!(s.last_method, Some(Browser));
}

#[tokio::test(start_paused = true)]
async fn scenario_c_404_moves_on_without_sleeping() {
    let (store, source) = setup("https://example.com/rss");
    let ex = Arc::new(ScriptedExtractor::new(vec![
        Err(ExtractError::Status {
            status: 404,
            message: "Not Found".into(),
        }),
        Ok(vec![item("https://example.com/a")]),
    ]));
    let exec = Executor::new(ex.clone(), store.clone(), ExecutorPolicy::default());

    let t0 = Instant::now();
    let done = exec.execute(&source, &[Rss, Html, Browser]).await.unwrap();
    assert_eq!(t0.elapsed(), Duration::ZERO);
    assert_eq!(done.method, Html);
    assert_eq!(ex.methods(), vec![Rss, Html]);

    let first = done.attempts[0].classification.as_ref().unwrap();
    assert_eq!(first.category, ErrorCategory::Site);
    assert!(!first.retryable);

    let s = store.get_source("s1").unwrap().unwrap();
    assert_eq!(s.last_successful_method, Some(Html));
    assert!(s.success_rate > 50.0);
}

#[tokio::test(start_paused = true)]
async fn empty_result_counts_as_content_failure() {
    let (store, source) = setup("https://example.com/rss");
    let ex = Arc::new(ScriptedExtractor::new(vec![
        Ok(vec![]),
        Ok(vec![item("https://example.com/b")]),
    ]));
    let exec = Executor::new(ex.clone(), store, ExecutorPolicy::default());

    let t0 = Instant::now();
    let done = exec.execute(&source, &[Rss, Html]).await.unwrap();
    assert_eq!(t0.elapsed(), Duration::ZERO);
    let first = done.attempts[0].classification.as_ref().unwrap();
    assert_eq!(first.category, ErrorCategory::Content);
}

#[tokio::test(start_paused = true)]
async fn success_rate_stays_bounded_over_many_runs() {
    let (store, _) = setup("https://example.com/rss");
    for round in 0..40 {
        let source = store.get_source("s1").unwrap().unwrap();
        let script = if round % 7 == 0 {
            vec![Ok(vec![item(&format!("https://example.com/{round}"))])]
        } else {
            vec![Err(ExtractError::Empty); 3]
        };
        let ex = Arc::new(ScriptedExtractor::new(script));
        let exec = Executor::new(ex, store.clone(), ExecutorPolicy::default());
        let _ = exec.execute(&source, &[Rss, Html, Browser]).await;
        let rate = store.get_source("s1").unwrap().unwrap().success_rate;
        assert!((0.0..=100.0).contains(&rate), "rate {rate} out of range");
    }
}

#[tokio::test(start_paused = true)]
async fn overlapping_failed_runs_both_lower_the_rate() {
    let (store, snapshot) = setup("https://example.com/rss");
    let parse = || Err(ExtractError::Parse("truncated feed".into()));
    let first = Executor::new(
        Arc::new(ScriptedExtractor::new(vec![parse()])),
        store.clone(),
        ExecutorPolicy::default(),
    );
    let second = Executor::new(
        Arc::new(ScriptedExtractor::new(vec![parse()])),
        store.clone(),
        ExecutorPolicy::default(),
    );

    // both runs start from the same row read at rate 50
    let (a, b) = tokio::join!(
        first.execute(&snapshot, &[Rss]),
        second.execute(&snapshot, &[Rss]),
    );
    assert!(a.is_err() && b.is_err());

    let rate = store.get_source("s1").unwrap().unwrap().success_rate;
    assert!((rate - 32.0).abs() < 1e-9, "rate {rate}");
}

#[tokio::test(start_paused = true)]
async fn slow_extractor_times_out_as_transport_failure() {
    struct Hang;

    #[async_trait::async_trait]
    impl content_pipeline::ingest::types::Extractor for Hang {
        async fn extract(
            &self,
            _req: &content_pipeline::ingest::types::ExtractRequest,
        ) -> Result<Vec<content_pipeline::ingest::types::ContentItem>, ExtractError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
        fn name(&self) -> &'static str {
            "hang"
        }
    }

    let (store, source) = setup("https://example.com/");
    let policy = ExecutorPolicy {
        max_attempts: 1,
        ..ExecutorPolicy::default()
    };
    let exec = Executor::new(Arc::new(Hang), store, policy);
    let failure = exec.execute(&source, &[Html]).await.unwrap_err();
    let class = failure.attempts[0].classification.as_ref().unwrap();
    assert_eq!(class.category, ErrorCategory::Transport);
    assert!(class.retryable);
}
