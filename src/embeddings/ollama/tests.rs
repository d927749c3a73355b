use super::*;
use crate::config::OllamaConfig;

use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

fn config_for(server: &MockServer, batch_size: u32) -> OllamaConfig {
    let address = server.address();
    OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: "nomic-embed-text".to_string(),
        batch_size,
        ..OllamaConfig::default()
    }
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 8,
        embedding_dimension: 384,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model(), "test-model");
    assert_eq!(client.batch_size, 8);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn retry_attempts_never_drop_below_one() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);

    let client = client.with_retry_attempts(4);
    assert_eq!(client.retry_attempts, 4);
}

#[test]
fn generate_request_serialization() {
    let request = GenerateRequest {
        model: "llama3.1:8b",
        prompt: "hello",
        stream: false,
        options: GenerateOptions { temperature: 0.0 },
        format: None,
    };
    let json = serde_json::to_value(&request).expect("request serializes");
    assert_eq!(json["stream"], false);
    assert_eq!(json["options"]["temperature"], 0.0);
    assert!(json.get("format").is_none());

    let request = GenerateRequest {
        format: Some("json"),
        ..request
    };
    let json = serde_json::to_value(&request).expect("request serializes");
    assert_eq!(json["format"], "json");
}

#[tokio::test(flavor = "multi_thread")]
async fn embeddings_are_requested_in_batches() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "nomic-embed-text",
            "embeddings": [[0.1, 0.2], [0.3, 0.4]]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2)).expect("Failed to create client");
    let texts: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();

    let embeddings = tokio::task::spawn_blocking(move || client.embed_documents(&texts))
        .await
        .expect("task should not panic")
        .expect("embedding should succeed");

    assert_eq!(embeddings.len(), 4);
    assert_eq!(embeddings[2], vec![0.1, 0.2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_count_mismatch_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2]]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 16)).expect("Failed to create client");
    let texts = vec!["one".to_string(), "two".to_string()];

    let result = tokio::task::spawn_blocking(move || client.embed_documents(&texts))
        .await
        .expect("task should not panic");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn judge_model_requests_json_output() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(serde_json::json!({
            "model": "judge-model",
            "stream": false,
            "format": "json"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "judge-model",
            "response": "{\"score\": 1}",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 16)).expect("Failed to create client");
    let judge = OllamaLanguageModel::for_judge(
        client,
        &JudgeConfig {
            model: "judge-model".to_string(),
        },
    );

    let output = tokio::task::spawn_blocking(move || judge.complete("Is this relevant?"))
        .await
        .expect("task should not panic")
        .expect("completion should succeed");

    assert_eq!(output, "{\"score\": 1}");
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_surface_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 16)).expect("Failed to create client");
    let model = OllamaLanguageModel::for_generation(client, &GenerationConfig::default());

    let result = tokio::task::spawn_blocking(move || model.complete("question"))
        .await
        .expect("task should not panic");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_model_accepts_implicit_latest_tag() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [
                {"name": "nomic-embed-text:latest", "size": 274302450u64},
                {"name": "llama3.1:8b"}
            ]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 16)).expect("Failed to create client");

    let (health, missing) = tokio::task::spawn_blocking(move || {
        (client.health_check(), client.validate_model("mistral"))
    })
    .await
    .expect("task should not panic");

    assert!(health.is_ok());
    assert!(missing.is_err());
}
