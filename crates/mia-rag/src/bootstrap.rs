//! Pipeline wiring from configuration
//!
//! Provider clients are built once here and shared by every request.

use crate::{create_chat_client, QueryPipeline, SynthesisSettings};
use mia_core::{AppConfig, Result};
use mia_vector::{create_embedding_client, PineconeIndex};
use std::sync::Arc;

/// Build the query pipeline described by `config`
///
/// Resolves the Pinecone host when only an environment is configured, so
/// this performs network I/O. Missing credentials surface here as
/// `MiaError::Configuration` rather than per request.
pub async fn build_pipeline(config: &AppConfig) -> Result<QueryPipeline> {
    config.validate()?;

    let embedder = create_embedding_client(&config.llm)?;
    tracing::info!(
        provider = ?config.llm.provider,
        model = embedder.model_name(),
        "Embedding client ready"
    );

    let index = PineconeIndex::connect(&config.pinecone, config.llm.timeout_secs).await?;

    let pipeline = QueryPipeline::new(embedder, Arc::new(index), config.rag.clone());

    if config.rag.synthesize_answer {
        let chat = create_chat_client(&config.llm)?;
        tracing::info!(provider = chat.name(), model = %config.llm.model, "Answer synthesis enabled");
        Ok(pipeline.with_synthesis(chat, SynthesisSettings::from_config(&config.llm)))
    } else {
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mia_core::{LlmProvider, MiaError, PineconeConfig};

    fn config(synthesize: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Ollama;
        config.pinecone = PineconeConfig {
            api_key: Some("pc-test".to_string()),
            index_name: Some("mia".to_string()),
            index_host: Some("http://127.0.0.1:5080".to_string()),
            ..PineconeConfig::default()
        };
        config.rag.synthesize_answer = synthesize;
        config
    }

    #[tokio::test]
    async fn test_build_retrieval_only() {
        let pipeline = build_pipeline(&config(false)).await.unwrap();
        assert!(!pipeline.synthesis_enabled());
        assert_eq!(pipeline.config().default_top_k, 3);
    }

    #[tokio::test]
    async fn test_build_with_synthesis() {
        let pipeline = build_pipeline(&config(true)).await.unwrap();
        assert!(pipeline.synthesis_enabled());
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_at_startup() {
        let err = build_pipeline(&AppConfig::default()).await.err().unwrap();
        assert!(matches!(err, MiaError::Configuration(_)));
    }
}
