//! MIA Vector - Embedding providers and vector index clients
//!
//! Implements the `EmbeddingClient` and `VectorIndex` traits from
//! `mia-core` against hosted services (OpenAI / Ollama embeddings,
//! Pinecone similarity search).

use mia_core::{MiaError, Result};
use reqwest::Client;
use std::time::Duration;

pub mod embedding;
pub mod pinecone;

pub use embedding::{create_embedding_client, OllamaEmbedding, OpenAiEmbedding};
pub use pinecone::PineconeIndex;

/// Build an HTTP client with a request timeout
pub fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MiaError::Configuration(format!("Failed to build HTTP client: {e}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    /// Serve `router` on an ephemeral local port and return its base URL
    pub async fn spawn_mock(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }
}
