//! Embedding client for generating vector representations
//!
//! Supports OpenAI and Ollama embedding APIs.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use mia_core::{EmbeddingClient, LlmConfig, LlmProvider, MiaError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| MiaError::Configuration("OpenAI API key required".to_string()))?;

        let mut client = Self::new(api_key.clone(), config.embedding_model.clone())
            .with_http_client(crate::http_client(config.timeout_secs)?);
        if let Some(url) = &config.openai_base_url {
            client = client.with_base_url(url.clone());
        }
        Ok(client)
    }

    /// Set custom base URL (for OpenAI-compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured HTTP client
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAiEmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MiaError::Embedding(format!("Embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MiaError::Embedding(format!(
                "OpenAI embedding error ({status}): {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MiaError::Embedding(format!("Failed to parse embedding response: {e}")))?;

        // Sort by index and extract embeddings
        let mut embeddings = result.data;
        embeddings.sort_by_key(|e| e.index);

        Ok(embeddings.into_iter().map(|e| e.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(
            Self::new(config.ollama_url.clone(), config.embedding_model.clone())
                .with_http_client(crate::http_client(config.timeout_secs)?),
        )
    }

    /// Use a preconfigured HTTP client
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| MiaError::Embedding(format!("Ollama embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MiaError::Embedding(format!(
                "Ollama embedding error ({status}): {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MiaError::Embedding(format!("Failed to parse embedding response: {e}")))?;

        Ok(result.embedding)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Ollama doesn't have native batch embedding, so we process sequentially
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed_one(text).await?);
        }
        Ok(results)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedding_client(config: &LlmConfig) -> Result<Arc<dyn EmbeddingClient>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Arc::new(OpenAiEmbedding::from_config(config)?)),
        LlmProvider::Ollama => Ok(Arc::new(OllamaEmbedding::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_mock;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[test]
    fn test_client_construction() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-large")
            .with_base_url("http://localhost:8000/v1/");
        assert_eq!(client.model_name(), "text-embedding-3-large");
        assert_eq!(client.base_url, "http://localhost:8000/v1");

        let client = OllamaEmbedding::new("http://localhost:11434/", "mxbai-embed-large");
        assert_eq!(client.model_name(), "mxbai-embed-large");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_empty_batch_skips_network() {
        // Unroutable base URL: any request would fail.
        let client = OpenAiEmbedding::new("test-key", "text-embedding-ada-002")
            .with_base_url("http://127.0.0.1:1");
        let result = tokio_test::block_on(client.embed_batch(&[])).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = LlmConfig::default();
        assert!(matches!(
            OpenAiEmbedding::from_config(&config),
            Err(MiaError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_openai_embed_orders_by_index() {
        let seen: Arc<Mutex<Option<(String, Value)>>> = Arc::new(Mutex::new(None));
        let captured = seen.clone();

        let router = Router::new().route(
            "/embeddings",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *captured.lock().unwrap() = Some((auth, body));
                    Json(json!({
                        "data": [
                            {"embedding": [0.3, 0.4], "index": 1},
                            {"embedding": [0.1, 0.2], "index": 0}
                        ]
                    }))
                }
            }),
        );
        let base = spawn_mock(router).await;

        let client = OpenAiEmbedding::new("sk-test", "text-embedding-ada-002").with_base_url(base);
        let vectors = client
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);

        let (auth, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Bearer sk-test");
        assert_eq!(body["model"], "text-embedding-ada-002");
        assert_eq!(body["input"], json!(["first", "second"]));
    }

    #[tokio::test]
    async fn test_openai_error_status() {
        let router = Router::new().route(
            "/embeddings",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
        );
        let base = spawn_mock(router).await;

        let client = OpenAiEmbedding::new("sk-test", "text-embedding-ada-002").with_base_url(base);
        let err = client.embed("ice cream").await.unwrap_err();
        assert!(matches!(err, MiaError::Embedding(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_openai_empty_data_is_an_error() {
        let router = Router::new().route(
            "/embeddings",
            post(|| async { Json(json!({"data": []})) }),
        );
        let base = spawn_mock(router).await;

        let client = OpenAiEmbedding::new("sk-test", "text-embedding-ada-002").with_base_url(base);
        let err = client.embed("ice cream").await.unwrap_err();
        assert!(matches!(err, MiaError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_ollama_embed_batch_is_sequential() {
        let router = Router::new().route(
            "/api/embeddings",
            post(|Json(body): Json<Value>| async move {
                let len = body["prompt"].as_str().map(str::len).unwrap_or_default();
                Json(json!({"embedding": [len as f32]}))
            }),
        );
        let base = spawn_mock(router).await;

        let client = OllamaEmbedding::new(base, "nomic-embed-text");
        let vectors = client
            .embed_batch(&["ab".to_string(), "abcd".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![2.0], vec![4.0]]);
    }

    #[tokio::test]
    async fn test_ollama_error_carries_status() {
        let router = Router::new().route(
            "/api/embeddings",
            post(|| async { (StatusCode::NOT_FOUND, "model \"nomic-embed-text\" not found") }),
        );
        let base = spawn_mock(router).await;

        let client = OllamaEmbedding::new(base, "nomic-embed-text");
        let err = client.embed("ice cream").await.unwrap_err();
        assert!(matches!(err, MiaError::Embedding(_)));
        let message = err.to_string();
        assert!(message.contains("Ollama embedding error (404 Not Found)"));
        assert!(message.contains("not found"));
    }

    #[test]
    fn test_factory_selects_provider() {
        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            embedding_model: "all-minilm".to_string(),
            ..LlmConfig::default()
        };
        let client = create_embedding_client(&config).unwrap();
        assert_eq!(client.model_name(), "all-minilm");

        let config = LlmConfig {
            openai_api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        let client = create_embedding_client(&config).unwrap();
        assert_eq!(client.model_name(), "text-embedding-ada-002");
    }
}
