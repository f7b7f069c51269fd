//! Catalog client against a mock HTTP server.

use civarc_core::catalog::{CatalogClient, CatalogSource, LookupOutcome};
use civarc_core::{ArchiveError, ContentHash};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

fn hash() -> ContentHash {
    ContentHash::from_hex(HASH)
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_lookup_by_hash_found() {
    let server = MockServer::start().await;
    mount(
        &server,
        &format!("/model-versions/by-hash/{}", HASH),
        ResponseTemplate::new(200).set_body_json(json!({
            "id": 11,
            "modelId": 7,
            "name": "v1.0",
            "updatedAt": "2024-03-01T12:00:00.000Z",
            "images": [{"url": "https://image.test/a/width=450/1.jpeg", "type": "image"}],
            "stats": {"downloadCount": 5}
        })),
    )
    .await;

    let client = CatalogClient::new(server.uri(), None).unwrap();
    let outcome = client.lookup_by_hash(&hash()).await.unwrap();

    let version = match outcome {
        LookupOutcome::Found(version) => version,
        other => panic!("expected Found, got {:?}", other),
    };
    assert_eq!(version.parsed.id, 11);
    assert_eq!(version.parsed.model_id, 7);
    assert_eq!(version.parsed.images.len(), 1);
    assert_eq!(version.raw["stats"]["downloadCount"], 5);
}

#[tokio::test]
async fn test_permanent_statuses_are_not_found() {
    for status in [400u16, 401, 403, 404, 410] {
        let server = MockServer::start().await;
        mount(
            &server,
            &format!("/model-versions/by-hash/{}", HASH),
            ResponseTemplate::new(status).set_body_json(json!({"error": "Model not found"})),
        )
        .await;

        let client = CatalogClient::new(server.uri(), None).unwrap();
        let outcome = client.lookup_by_hash(&hash()).await.unwrap();
        assert_eq!(outcome, LookupOutcome::NotFound { status });
    }
}

#[tokio::test]
async fn test_server_errors_are_retryable() {
    for status in [429u16, 500, 503] {
        let server = MockServer::start().await;
        mount(&server, "/model-versions/11", ResponseTemplate::new(status)).await;

        let client = CatalogClient::new(server.uri(), None).unwrap();
        let err = client.lookup_version_by_id(11).await.unwrap_err();
        assert!(
            matches!(err, ArchiveError::CatalogStatus { status: s, .. } if s == status),
            "unexpected error {:?}",
            err
        );
        assert!(err.is_retryable());
    }
}

#[tokio::test]
async fn test_malformed_payloads() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/model-versions/1",
        ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"),
    )
    .await;
    mount(
        &server,
        "/model-versions/2",
        ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "no model id"})),
    )
    .await;

    let client = CatalogClient::new(server.uri(), None).unwrap();
    for id in [1, 2] {
        let err = client.lookup_version_by_id(id).await.unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedPayload { .. }));
        assert!(err.is_retryable());
    }
}

#[tokio::test]
async fn test_model_lookup_with_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/7"))
        .and(header("Authorization", "Bearer secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "name": "Detail Tweaker",
            "type": "LORA",
            "creator": {"username": "someone"}
        })))
        .mount(&server)
        .await;

    let client = CatalogClient::new(server.uri(), Some("secret-key".to_string())).unwrap();
    let model = client.lookup_model_by_id(7).await.unwrap().found().unwrap();
    assert_eq!(model.parsed.name, "Detail Tweaker");
    assert_eq!(
        model.parsed.creator.and_then(|c| c.username).as_deref(),
        Some("someone")
    );
}

#[tokio::test]
async fn test_unreachable_server_is_retryable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = CatalogClient::new(uri, None).unwrap();
    let err = client.lookup_model_by_id(1).await.unwrap_err();
    assert!(err.is_retryable(), "unexpected error {:?}", err);
}
