//! Transport behavior against a local HTTP server.

use std::time::{Duration, Instant};

use catalog_tracker::error::{ContentError, FetchError, TransportError};
use catalog_tracker::models::{FetchConfig, RequestMethod};
use catalog_tracker::services::Transport;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> FetchConfig {
    FetchConfig {
        connect_timeout_secs: 2,
        stall_timeout_secs: 1,
        fallback_delay_ms: 0,
        min_payload_bytes: 64,
        ..FetchConfig::default()
    }
}

fn catalog(count: usize) -> String {
    let mut body = String::from("#EXTM3U\n");
    for n in 0..count {
        body.push_str(&format!(
            "#EXTINF:-1 group-title=\"News\",Channel {n}\nhttp://cdn.example/live/{n}.ts\n"
        ));
    }
    body
}

#[tokio::test]
async fn test_get_returns_catalog() {
    let server = MockServer::start().await;
    let body = catalog(10);
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let transport = Transport::new(&test_config()).unwrap();
    let bytes = transport
        .fetch(&format!("{}/list", server.uri()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(bytes, body.as_bytes());
}

#[tokio::test]
async fn test_download_writes_file() {
    let server = MockServer::start().await;
    let body = catalog(50);
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("nested").join("out.m3u");
    let transport = Transport::new(&test_config()).unwrap();
    let size = transport
        .download(
            &format!("{}/list", server.uri()),
            &target,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(size, body.len() as u64);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), body);
}

#[tokio::test]
async fn test_block_page_is_rejected() {
    let server = MockServer::start().await;
    let page = format!(
        "<!DOCTYPE html><html><body>Access denied{}</body></html>",
        " ".repeat(200)
    );
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;

    let transport = Transport::new(&test_config()).unwrap();
    let err = transport
        .fetch(&format!("{}/list", server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Content(ContentError::BlockedResponse)
    ));
}

#[tokio::test]
async fn test_error_document_is_rejected() {
    let server = MockServer::start().await;
    let doc = format!(r#"{{"error": "account expired", "pad": "{}"}}"#, "x".repeat(100));
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(doc))
        .mount(&server)
        .await;

    let transport = Transport::new(&test_config()).unwrap();
    let err = transport
        .fetch(&format!("{}/list", server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Content(ContentError::MalformedPayload)
    ));
}

#[tokio::test]
async fn test_http_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let transport = Transport::new(&test_config()).unwrap();
    let err = transport
        .fetch(&format!("{}/missing", server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Transport(TransportError::HttpStatus(404))
    ));
}

#[tokio::test]
async fn test_fallback_method_succeeds() {
    let server = MockServer::start().await;
    let body = catalog(5);
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let transport = Transport::new(&test_config()).unwrap();
    let bytes = transport
        .fetch(&format!("{}/list", server.uri()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(bytes, body.as_bytes());
}

#[tokio::test]
async fn test_post_primary_falls_back_to_get() {
    let server = MockServer::start().await;
    let body = catalog(5);
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .mount(&server)
        .await;

    let config = FetchConfig {
        primary_method: RequestMethod::Post,
        ..test_config()
    };
    let transport = Transport::new(&config).unwrap();
    let bytes = transport
        .fetch(&format!("{}/list", server.uri()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(bytes, body.as_bytes());
}

#[tokio::test]
async fn test_oversized_payload_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(catalog(100)))
        .mount(&server)
        .await;

    let config = FetchConfig {
        max_payload_bytes: 1000,
        ..test_config()
    };
    let transport = Transport::new(&config).unwrap();
    let err = transport
        .fetch(&format!("{}/list", server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Content(ContentError::OversizedPayload { limit: 1000 })
    ));
}

#[tokio::test]
async fn test_tiny_payload_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
        .mount(&server)
        .await;

    let transport = Transport::new(&test_config()).unwrap();
    let err = transport
        .fetch(&format!("{}/list", server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Content(ContentError::EmptyPayload { bytes: 8 })
    ));
}

#[tokio::test]
async fn test_stalled_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(catalog(5))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let transport = Transport::new(&test_config()).unwrap();
    let started = Instant::now();
    let err = transport
        .fetch(&format!("{}/slow", server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport(TransportError::Timeout)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancellation_interrupts_fetch() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(catalog(5))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let config = FetchConfig {
        stall_timeout_secs: 30,
        ..test_config()
    };
    let transport = Transport::new(&config).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = transport
        .fetch(&format!("{}/slow", server.uri()), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}
