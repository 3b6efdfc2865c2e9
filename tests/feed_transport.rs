// tests/feed_transport.rs
// FeedExtractor against a real socket: the failure text that reaches the
// classifier has to carry the underlying connect error.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use content_pipeline::ingest::classify::{classify, ErrorCategory, Severity};
use content_pipeline::ingest::methods::ExtractionMethod;
use content_pipeline::ingest::providers::feed::FeedExtractor;
use content_pipeline::ingest::types::{ExtractError, ExtractRequest, Extractor};

/// Accepts one connection and answers a TLS client hello with plain HTTP.
async fn plaintext_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 8192];
        let _ = stream.read(&mut buf).await;
        let _ = stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
            .await;
        let _ = stream.flush().await;
        // keep the socket open so the client sees our bytes, not a reset
        tokio::time::sleep(Duration::from_secs(5)).await;
    });
    port
}

fn request(address: String) -> ExtractRequest {
    ExtractRequest {
        address,
        source_id: "s1".into(),
        region: None,
        topic_id: None,
        method: ExtractionMethod::Rss,
    }
}

#[tokio::test]
async fn tls_failure_against_plain_listener_is_not_retryable() {
    let port = plaintext_server().await;
    let feed = FeedExtractor::new(Duration::from_secs(10)).unwrap();

    let err = feed
        .extract(&request(format!("https://127.0.0.1:{port}/rss")))
        .await
        .unwrap_err();

    let ExtractError::Transport(ref message) = err else {
        panic!("expected a transport error, got {err:?}");
    };
    assert!(message.contains("error sending request"), "{message}");

    let c = classify(&err);
    assert_eq!(c.category, ErrorCategory::Transport, "{message}");
    assert_eq!(c.severity, Severity::High, "{message}");
    assert!(!c.retryable, "{message}");
}

#[tokio::test]
async fn refused_connection_keeps_its_os_cause() {
    // bind then drop to get a port nothing listens on
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let feed = FeedExtractor::new(Duration::from_secs(10)).unwrap();

    let err = feed
        .extract(&request(format!("http://127.0.0.1:{port}/rss")))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.to_lowercase().contains("refused"), "{message}");
    assert!(matches!(err, ExtractError::Transport(_)));
}
