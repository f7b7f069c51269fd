//! Asset downloads against a mock HTTP server.

use civarc_core::network::{temp_path_for, AssetFetcher, HttpAssetFetcher};
use civarc_core::ArchiveError;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fetch_writes_file() {
    let server = MockServer::start().await;
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/images/1.jpeg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("bundle").join("m_preview_0.jpeg");
    let fetcher = HttpAssetFetcher::new(None).unwrap();

    let bytes = fetcher
        .fetch(&format!("{}/images/1.jpeg", server.uri()), &dest)
        .await
        .unwrap();

    assert_eq!(bytes, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!temp_path_for(&dest).exists());
}

#[tokio::test]
async fn test_fetch_failure_leaves_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images/gone.jpeg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/images/busy.jpeg"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("m_preview_0.jpeg");
    let fetcher = HttpAssetFetcher::new(None).unwrap();

    let err = fetcher
        .fetch(&format!("{}/images/gone.jpeg", server.uri()), &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::DownloadFailed { status: 404, .. }));
    assert!(!err.is_retryable());

    let err = fetcher
        .fetch(&format!("{}/images/busy.jpeg", server.uri()), &dest)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    assert!(!dest.exists());
    assert!(!temp_path_for(&dest).exists());
}
