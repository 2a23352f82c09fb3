//! API Integration Tests
//!
//! Drive the router in-process with mock providers.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use mia_api::{create_router, state::AppState};
use mia_core::{
    config::ServerConfig, ChatClient, ChatRequest, EmbeddingClient, IndexQuery, Match, MiaError,
    RagConfig, Result, VectorIndex,
};
use mia_rag::{QueryPipeline, SynthesisSettings};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

// =============================================================================
// Mock providers
// =============================================================================

struct MockEmbedder {
    fail: bool,
}

#[async_trait]
impl EmbeddingClient for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(MiaError::Embedding("upstream unavailable".to_string()));
        }
        Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

/// Index holding a fixed set of records, honoring top-k and `source` equality filters
struct MockIndex {
    records: Vec<Match>,
    last: Mutex<Option<IndexQuery>>,
}

#[async_trait]
impl VectorIndex for MockIndex {
    async fn query(&self, query: &IndexQuery) -> Result<Vec<Match>> {
        *self.last.lock().unwrap() = Some(query.clone());

        let wanted = query
            .filter
            .as_ref()
            .and_then(|f| f.get("source"))
            .and_then(Value::as_str);

        Ok(self
            .records
            .iter()
            .filter(|m| match wanted {
                Some(source) => m.metadata.get("source").and_then(|v| v.as_str()) == Some(source),
                None => true,
            })
            .take(query.top_k)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "mock-index"
    }
}

struct MockChat;

#[async_trait]
impl ChatClient for MockChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        Ok(format!("Answer to: {}", request.messages[1].content))
    }

    fn name(&self) -> &str {
        "mock-chat"
    }
}

fn records() -> Vec<Match> {
    let recorded_at = "2023-11-06T14:30:05Z"
        .parse::<chrono::DateTime<chrono::Utc>>()
        .unwrap();
    vec![
        Match::new("rec-1", 0.93)
            .with_metadata("source", "recording")
            .with_metadata("text", "We got ice cream after the movie")
            .with_metadata("created_at", recorded_at),
        Match::new("note-1", 0.88).with_metadata("source", "note"),
        Match::new("rec-2", 0.81).with_metadata("source", "recording"),
        Match::new("rec-3", 0.77).with_metadata("source", "recording"),
        Match::new("rec-4", 0.70).with_metadata("source", "recording"),
    ]
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    index: Arc<MockIndex>,
}

fn build_app(fail_embedding: bool, synthesize: bool) -> TestApp {
    let index = Arc::new(MockIndex {
        records: records(),
        last: Mutex::new(None),
    });
    let mut pipeline = QueryPipeline::new(
        Arc::new(MockEmbedder {
            fail: fail_embedding,
        }),
        index.clone(),
        RagConfig::default(),
    );
    if synthesize {
        pipeline = pipeline.with_synthesis(Arc::new(MockChat), SynthesisSettings::default());
    }

    let state = Arc::new(AppState::new(ServerConfig::default(), Arc::new(pipeline)));
    TestApp {
        router: create_router(state.clone()),
        state,
        index,
    }
}

fn post_raw(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

// =============================================================================
// Query endpoint
// =============================================================================

#[tokio::test]
async fn test_query_with_filter_and_top_k() {
    let app = build_app(false, false);
    let request = post_raw(
        "/api/v1/query",
        json!({
            "query_text": "ice cream",
            "query_filter": {"source": "recording"},
            "query_top_k": 3
        })
        .to_string(),
    );

    let (status, body) = send(app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Processing complete");

    let output = body["output"].as_array().unwrap();
    assert_eq!(output.len(), 3);
    for item in output {
        assert!(item["id"].is_string());
        assert!(item["score"].is_number());
        assert_eq!(item["metadata"]["source"], "recording");
    }
    assert_eq!(output[0]["id"], "rec-1");
    assert_eq!(output[0]["metadata"]["created_at"], "2023-11-06T14:30:05Z");

    let query = app.index.last.lock().unwrap().clone().unwrap();
    assert_eq!(query.top_k, 3);
    assert!(query.include_metadata);
}

#[tokio::test]
async fn test_query_empty_object_uses_defaults() {
    let app = build_app(false, false);
    let (status, body) = send(app.router, post_raw("/api/v1/query", "{}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"].as_array().unwrap().len(), 3);

    let query = app.index.last.lock().unwrap().clone().unwrap();
    assert_eq!(query.top_k, 3);
    assert_eq!(query.filter, None);
}

#[tokio::test]
async fn test_query_filter_matching_nothing() {
    let app = build_app(false, false);
    let request = post_raw(
        "/api/v1/query",
        json!({"query_filter": {"source": "email"}}).to_string(),
    );

    let (status, body) = send(app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"], json!([]));
}

#[tokio::test]
async fn test_query_malformed_json() {
    let app = build_app(false, false);
    let (status, body) = send(app.router, post_raw("/api/v1/query", "{\"query_text\": ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_query_invalid_utf8() {
    let app = build_app(false, false);
    let (status, body) = send(
        app.router,
        post_raw("/api/v1/query", vec![0xff_u8, 0xfe, 0xfd]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Malformed request: body is not UTF-8"));
    assert_eq!(body.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn test_query_embedding_failure() {
    let app = build_app(true, false);
    let request = post_raw("/api/v1/query", json!({"query_text": "x"}).to_string());

    let (status, body) = send(app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Embedding error: upstream unavailable"}));
}

#[tokio::test]
async fn test_query_rejects_zero_top_k() {
    let app = build_app(false, false);
    let request = post_raw("/api/v1/query", json!({"query_top_k": "0"}).to_string());

    let (status, body) = send(app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Malformed request: "));
}

#[tokio::test]
async fn test_query_with_synthesis() {
    let app = build_app(false, true);
    let request = post_raw(
        "/api/v1/query",
        json!({"query_text": "what did we eat?"}).to_string(),
    );

    let (status, body) = send(app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gpt_output"], "Answer to: what did we eat?");
    assert!(body.get("output").is_none());
}

// =============================================================================
// Invoke endpoint
// =============================================================================

#[tokio::test]
async fn test_invoke_with_string_body() {
    let app = build_app(false, false);
    let event = json!({
        "body": json!({"query_text": "ice cream", "query_top_k": "2"}).to_string()
    });

    let (status, envelope) = send(app.router, post_raw("/api/v1/invoke", event.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(envelope["statusCode"], 200);

    let body: Value = serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["output"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_invoke_with_object_body() {
    let app = build_app(false, false);
    let event = json!({"body": {"query_filter": {"source": "note"}}});

    let (status, envelope) = send(app.router, post_raw("/api/v1/invoke", event.to_string())).await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["output"][0]["id"], "note-1");
}

#[tokio::test]
async fn test_invoke_malformed_event() {
    let app = build_app(false, false);

    let (status, envelope) = send(app.router, post_raw("/api/v1/invoke", "nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope["statusCode"], 400);

    let body: Value = serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
    assert!(body["error"].is_string());
}

// =============================================================================
// Health and metrics
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = build_app(false, false);
    let (status, body) = send(app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = build_app(false, true);
    let (status, body) = send(app.router.clone(), get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["synthesis_enabled"], true);

    app.state.set_ready(false);
    let (status, _) = send(app.router, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_count_queries() {
    let app = build_app(false, false);
    for _ in 0..2 {
        send(app.router.clone(), post_raw("/api/v1/query", "{}")).await;
    }
    send(app.router.clone(), get("/health")).await;

    let (status, body) = send(app.router, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_requests"], 2);
    assert_eq!(app.state.get_request_count(), 2);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = build_app(false, false);
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn test_openapi_document() {
    let app = build_app(false, false);
    let (status, body) = send(app.router, get("/api-docs/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/query"].is_object());
    assert!(body["paths"]["/api/v1/invoke"].is_object());

    // Failures are documented as envelope bodies only
    let schemas = &body["components"]["schemas"];
    assert!(schemas["QueryResult"]["properties"]["error"].is_object());
    assert!(schemas["ApiError"].is_null());
}
