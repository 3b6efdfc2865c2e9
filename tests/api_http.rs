// tests/api_http.rs
//
// HTTP-level tests for the trigger Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /acquire (named source, unknown source, bad body, empty batch)
// - POST /process-queue
// - GET /sources, GET /queue/stats

mod common;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use std::sync::Arc;
use tower::ServiceExt as _;

use common::{item, story, ScriptedExtractor, ScriptedGenerator};
use content_pipeline::api::{self, AppState};
use content_pipeline::config::Tunables;
use content_pipeline::metrics::Metrics;
use content_pipeline::models::Source;
use content_pipeline::{Pipeline, Store};

const BODY_LIMIT: usize = 1024 * 1024;

struct Harness {
    app: Router,
    store: Arc<Store>,
}

fn harness(extractor: ScriptedExtractor, generator: ScriptedGenerator) -> Harness {
    let store = Arc::new(Store::open_in_memory().expect("in-memory store"));
    let pipeline = Pipeline::assemble(
        store.clone(),
        Arc::new(extractor),
        Arc::new(generator),
        &Tunables::default(),
    );
    let app = api::router(AppState { pipeline }, &Metrics::detached());
    Harness { app, store }
}

async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

#[tokio::test]
async fn health_returns_ok() {
    let h = harness(ScriptedExtractor::new(vec![]), ScriptedGenerator::new(vec![]));
    let resp = h
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn named_source_is_acquired_and_queued_then_processed() {
    let h = harness(
        ScriptedExtractor::new(vec![Ok(vec![
            item("https://news.example.com/a"),
            item("https://news.example.com/b"),
        ])]),
        ScriptedGenerator::new(vec![
            Ok(story("st-a", 6, Some(82.0))),
            Ok(story("st-b", 5, Some(40.0))),
        ]),
    );
    h.store
        .upsert_source(&Source::new("s1", "t1", "https://news.example.com/rss"))
        .unwrap();

    let (status, body) = send(&h.app, "POST", "/acquire", r#"{"sourceId":"s1"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["sourceId"], "s1");
    assert_eq!(body["articlesImported"], 2);
    assert_eq!(body["jobsQueued"], 2);
    assert_eq!(body["methodUsed"], "rss");
    assert_eq!(body["attemptsMade"], 1);
    assert!(body["strategyInfo"]["confidence"].is_number());

    let (_, stats) = send(&h.app, "GET", "/queue/stats", "").await;
    assert_eq!(stats["pending"], 2);

    let (status, run) = send(&h.app, "POST", "/process-queue", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["success"], true);
    assert_eq!(run["processed"], 2);
    assert_eq!(run["results"][0]["slideCount"], 6);
    assert!(run["results"][0].get("skipped").is_none());

    let (_, stats) = send(&h.app, "GET", "/queue/stats", "").await;
    assert_eq!(stats["pending"], 0);
    assert_eq!(stats["completed"], 2);

    let (status, sources) = send(&h.app, "GET", "/sources", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sources[0]["id"], "s1");
    assert_eq!(sources[0]["lastSuccessfulMethod"], "rss");
    assert_eq!(sources[0]["contentItems"], 2);
}

#[tokio::test]
async fn unknown_source_is_a_failed_result_not_an_http_error() {
    let h = harness(ScriptedExtractor::new(vec![]), ScriptedGenerator::new(vec![]));
    let (status, body) = send(&h.app, "POST", "/acquire", r#"{"sourceId":"nope"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "source nope not found");
}

#[tokio::test]
async fn malformed_body_is_rejected_with_400() {
    let h = harness(ScriptedExtractor::new(vec![]), ScriptedGenerator::new(vec![]));
    for uri in ["/acquire", "/process-queue"] {
        let (status, body) = send(&h.app, "POST", uri, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("invalid body"));
    }

    let (status, _) = send(&h.app, "POST", "/process-queue", r#"{"jobType":"render_video"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_batch_runs_report_zero_processed() {
    let h = harness(ScriptedExtractor::new(vec![]), ScriptedGenerator::new(vec![]));

    let (status, body) = send(&h.app, "POST", "/acquire", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "processed": 0, "results": [] }));

    let (status, body) = send(&h.app, "POST", "/process-queue", "  ").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 0);
    assert_eq!(body["results"], json!([]));
}
