#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Command-level tests against a mock Ollama server

use std::sync::Arc;

use rag_eval::RagError;
use rag_eval::commands::{ask, evaluate};
use rag_eval::config::{Config, OllamaConfig};
use rag_eval::documents::SourceDocument;
use rag_eval::embeddings::OllamaClient;
use rag_eval::evaluation::ScoredTable;
use rag_eval::indexer::Indexer;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const ANSWER: &str = "Either party may terminate with 30 days notice.";

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    ["terminat", "rent", "notice"]
        .iter()
        .map(|word| if lower.contains(word) { 1.0 } else { 0.0 })
        .collect()
}

/// `/api/embed` answering one keyword vector per input
fn embed_responder(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
    let embeddings: Vec<Vec<f32>> = body["input"]
        .as_array()
        .map(|inputs| {
            inputs
                .iter()
                .map(|input| keyword_vector(input.as_str().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();

    ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
}

async fn mount_ollama(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(embed_responder)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("Helpful Answer:"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": ANSWER })))
        .mount(server)
        .await;
}

/// One JSON verdict per judge metric, each expected exactly once
async fn mount_judge(server: &MockServer) {
    let verdicts = [
        (
            "Evaluate whether the answer is faithful",
            json!({ "claims": [{ "claim": "30 days notice", "supported": true }] }),
        ),
        (
            "Evaluate how relevant",
            json!({ "relevance_score": 0.9, "reasoning": "direct answer" }),
        ),
        (
            "Evaluate whether the retrieved context contains",
            json!({ "statements": [
                { "statement": "30 days", "attributed": true },
                { "statement": "notice", "attributed": false }
            ] }),
        ),
        (
            "Evaluate the precision",
            json!({ "verdicts": [
                { "chunk_index": 0, "relevant": true },
                { "chunk_index": 1, "relevant": false }
            ] }),
        ),
    ];

    for (prompt_start, verdict) in verdicts {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({ "format": "json" })))
            .and(body_string_contains(prompt_start))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": verdict.to_string() })),
            )
            .expect(1)
            .mount(server)
            .await;
    }
}

fn config_for(server: &MockServer, temp_dir: &TempDir) -> Config {
    let address = server.address();
    let mut config = Config::load(temp_dir.path()).expect("defaults should load");
    config.ollama = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        ..OllamaConfig::default()
    };
    config
}

async fn index_lease(config: &Config) {
    let client = OllamaClient::new(&config.ollama).expect("client should build");
    let documents = vec![
        SourceDocument {
            source: "source_documents/lease.pdf".to_string(),
            page: 0,
            text: "Rent is payable monthly in advance.".to_string(),
        },
        SourceDocument {
            source: "source_documents/lease.pdf".to_string(),
            page: 1,
            text: "Either party may terminate this lease with 30 days notice.".to_string(),
        },
    ];

    Indexer::new(Arc::new(client), config.chunking.clone())
        .index_documents(&documents, &config.vector_store_path())
        .await
        .expect("indexing should succeed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ask_before_indexing_reports_missing_index() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&server, &temp_dir);

    let error = ask(&config, "What is the termination clause?")
        .await
        .expect_err("no index yet");
    assert!(matches!(
        error.downcast_ref::<RagError>(),
        Some(RagError::IndexNotBuilt(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ask_returns_answer_and_contexts() {
    let server = MockServer::start().await;
    mount_ollama(&server).await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&server, &temp_dir);
    index_lease(&config).await;

    let response = ask(&config, "What is the termination clause?")
        .await
        .expect("ask should succeed");

    assert_eq!(response.answer, ANSWER);
    assert_eq!(response.contexts.len(), 2);
    assert!(response.contexts[0].contains("terminate"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn evaluate_writes_scored_table() {
    let server = MockServer::start().await;
    mount_ollama(&server).await;
    mount_judge(&server).await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&server, &temp_dir);
    index_lease(&config).await;

    let test_set = temp_dir.path().join("data").join("legal_test_set.json");
    std::fs::create_dir_all(test_set.parent().expect("has parent")).expect("should create dir");
    std::fs::write(
        &test_set,
        r#"[{"question": "What is the termination clause?", "ground_truth_answer": "30 days notice"}]"#,
    )
    .expect("should write test set");

    let table = evaluate(&config, Some(test_set), None)
        .await
        .expect("evaluation should succeed");

    assert_eq!(table.len(), 1);
    let row = &table.rows()[0];
    assert_eq!(row.answer, ANSWER);
    assert_eq!(row.ground_truth, "30 days notice");
    assert!((row.scores.faithfulness - 1.0).abs() < 1e-9);
    assert!((row.scores.answer_relevancy - 0.9).abs() < 1e-9);
    assert!((row.scores.context_recall - 0.5).abs() < 1e-9);
    assert!((row.scores.context_precision - 1.0).abs() < 1e-9);

    let saved = ScoredTable::read_csv(&config.scores_path()).expect("scores should be saved");
    assert_eq!(saved, table);
}
