use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mindgraph::backend::{Backend, HttpBackend};
use mindgraph::config::{BackendConfig, RequestConfig};
use mindgraph::error::BackendError;

fn backend(server: &MockServer, max_retries: u32) -> HttpBackend {
    let config = BackendConfig {
        api_key: "test_key".to_string(),
        base_url: server.uri(),
        model: "test-model".to_string(),
    };
    let request = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };
    HttpBackend::new(&config, request).unwrap()
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
}

#[tokio::test]
async fn test_generate_sends_system_and_user_messages() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test_key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [
                {"role": "system", "content": "You navigate."},
                {"role": "user", "content": "where to?"}
            ]
        })))
        .respond_with(completion("STAY"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server, 0);
    let reply = backend.generate("You navigate.", "where to?").await.unwrap();
    assert_eq!(reply, "STAY");
}

#[tokio::test]
async fn test_transient_server_errors_are_retried() {
    let server = MockServer::start().await;

    // Two failures, then success; priority ordering makes the 500s fire first.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("recovered"))
        .with_priority(2)
        .mount(&server)
        .await;

    let backend = backend(&server, 3);
    let reply = backend.generate("role", "prompt").await.unwrap();
    assert_eq!(reply, "recovered");
}

#[tokio::test]
async fn test_retry_exhaustion_reports_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .expect(3)
        .mount(&server)
        .await;

    let backend = backend(&server, 2);
    let err = backend.generate("role", "prompt").await.unwrap_err();
    match err {
        BackendError::Unavailable { retries, message } => {
            assert_eq!(retries, 3, "initial attempt plus two retries");
            assert!(message.contains("503"));
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_choices_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let backend = backend(&server, 0);
    let err = backend.generate("role", "prompt").await.unwrap_err();
    assert!(matches!(err, BackendError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_client_error_body_is_preserved() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let backend = backend(&server, 0);
    let err = backend.generate("role", "prompt").await.unwrap_err();
    match err {
        BackendError::Unavailable { message, .. } => {
            // The last attempt's API error is carried in the summary.
            assert!(message.contains("401"));
            assert!(message.contains("bad key"));
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}
