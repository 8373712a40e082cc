//! Manifest fetch tests: one GET per call, failures classified for retry.

use std::time::Duration;

use autoupdate_core::manifest::MAX_MANIFEST_BYTES;
use autoupdate_core::{FetchError, ManifestFetcher, Retryable, Sha256Digest, Version};
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;

fn fetcher() -> ManifestFetcher {
    ManifestFetcher::new(autoupdate_core::http::build_client().unwrap())
}

fn url(server: &MockServer) -> String {
    format!("{}/version.json", server.uri())
}

#[tokio::test]
async fn test_fetch_parses_manifest() {
    let server = MockServer::start().await;
    let digest = Sha256Digest::from_bytes(b"pkg");
    Mock::given(method("GET"))
        .and(path("/version.json"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "1.0.1",
            "sha256": digest.as_str(),
            "description": "Bug fixes",
            "release_date": "2024-05-01",
            "min_required": "1.0.0"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manifest = fetcher()
        .fetch(&url(&server), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(manifest.version, Version::new(1, 0, 1));
    assert_eq!(manifest.sha256, digest);
    assert_eq!(manifest.release_date, "2024-05-01");
}

#[tokio::test]
async fn test_fetch_uppercase_digest_is_normalised() {
    let server = MockServer::start().await;
    let digest = Sha256Digest::from_bytes(b"pkg");
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "1.0.1",
            "sha256": digest.as_str().to_uppercase(),
            "description": "",
            "release_date": "",
            "min_required": "1.0.0"
        })))
        .mount(&server)
        .await;

    let manifest = fetcher()
        .fetch(&url(&server), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(manifest.sha256, digest);
}

#[tokio::test]
async fn test_fetch_bad_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&url(&server), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::BadStatus { status: 404 });
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_fetch_malformed_body_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&url(&server), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::MalformedBody(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_fetch_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&url(&server), Duration::from_millis(150))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Timeout { limit_ms: 150 });
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    let dead = format!("http://127.0.0.1:{}/version.json", support::closed_port());

    let err = fetcher()
        .fetch(&dead, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Connection(_)));
}

#[tokio::test]
async fn test_fetch_rejects_oversized_advertised_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b' '; MAX_MANIFEST_BYTES + 1]))
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&url(&server), Duration::from_secs(5))
        .await
        .unwrap_err();
    match err {
        FetchError::MalformedBody(msg) => assert!(msg.contains("limit"), "{msg}"),
        other => panic!("expected MalformedBody, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_rejects_oversized_chunked_body() {
    let half = vec![b' '; MAX_MANIFEST_BYTES / 2 + 1];
    let base = support::serve_chunked(vec![half.clone(), half]).await;

    let err = fetcher()
        .fetch(&format!("{base}/version.json"), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::MalformedBody(_)), "{err:?}");
    assert!(!err.is_retryable());
}
