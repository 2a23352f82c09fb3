//! MIA RAG - Query pipeline
//!
//! Turns a raw request into a ranked, serializable result set:
//!
//! 1. Normalize the inbound payload into a `QueryRequest`
//! 2. Embed the query text and search the vector index
//! 3. Assemble the matches, optionally synthesizing an answer from them
//!
//! Any failure is caught at the boundary and reported as a 400 envelope.
//!
//! Author: hephaex@gmail.com

use mia_core::{
    ChatClient, ChatMessage, ChatRequest, EmbeddingClient, IndexQuery, LlmConfig, Match, MiaError,
    QueryOutput, QueryRequest, RagConfig, RawRequest, ResponseEnvelope, Result, VectorIndex,
};
use std::sync::Arc;
use std::time::Instant;

pub mod bootstrap;
pub mod llm;

pub use bootstrap::build_pipeline;
pub use llm::{create_chat_client, OllamaClient, OpenAiClient};

/// Instruction framing the assistant for answer synthesis
pub const COMPANION_INSTRUCTION: &str = "You are the user's companion. Help them using the context provided from metadata text. Do not make up any information, admit if you don't know something. Context:";

// ============================================================================
// Synthesis Settings
// ============================================================================

/// Sampling parameters for answer synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisSettings {
    pub model: String,
    pub seed: Option<i64>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

impl SynthesisSettings {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            seed: config.seed,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

struct Synthesizer {
    client: Arc<dyn ChatClient>,
    settings: SynthesisSettings,
}

// ============================================================================
// Query Pipeline
// ============================================================================

/// Normalize → Retrieve → Assemble pipeline
pub struct QueryPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    config: RagConfig,
    synthesizer: Option<Synthesizer>,
}

impl QueryPipeline {
    /// Create a retrieval-only pipeline
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        config: RagConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
            synthesizer: None,
        }
    }

    /// Enable answer synthesis
    pub fn with_synthesis(mut self, client: Arc<dyn ChatClient>, settings: SynthesisSettings) -> Self {
        self.synthesizer = Some(Synthesizer { client, settings });
        self
    }

    pub fn synthesis_enabled(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Run the pipeline and wrap the outcome in a response envelope
    ///
    /// Never fails: errors from any stage become a 400 envelope carrying
    /// the error's display message.
    pub async fn handle(&self, raw: RawRequest) -> ResponseEnvelope {
        let start = Instant::now();

        match self.run(raw).await {
            Ok(output) => {
                tracing::info!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query processed"
                );
                ResponseEnvelope::success(&output)
            }
            Err(e) => {
                tracing::error!(error = ?e, "Query failed: {e}");
                ResponseEnvelope::failure(e.to_string())
            }
        }
    }

    /// Run the pipeline, propagating the first stage error
    pub async fn run(&self, raw: RawRequest) -> Result<QueryOutput> {
        let request = self.normalize(raw)?;
        let matches = self.retrieve(&request).await?;
        self.assemble(&request, matches).await
    }

    /// Normalize a raw payload using this pipeline's defaults
    pub fn normalize(&self, raw: RawRequest) -> Result<QueryRequest> {
        mia_core::normalize(raw, &self.config)
    }

    /// Embed the query text and return the nearest matches in index order
    pub async fn retrieve(&self, request: &QueryRequest) -> Result<Vec<Match>> {
        tracing::debug!(
            top_k = request.top_k,
            filtered = !request.filter.is_empty(),
            "Retrieval started"
        );

        let vector = self
            .embedder
            .embed_batch(std::slice::from_ref(&request.text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MiaError::Embedding("No embedding returned".to_string()))?;

        let query = IndexQuery::new(vector, request.top_k).with_filter(request.filter_expression());
        let mut matches = self.index.query(&query).await?;
        matches.truncate(request.top_k);

        if request.show_log {
            for m in &matches {
                tracing::info!(
                    id = %m.id,
                    score = m.score,
                    metadata = %serde_json::to_string(&m.metadata).unwrap_or_default(),
                    "Match"
                );
            }
            tracing::info!(count = matches.len(), index = self.index.name(), "Matches retrieved");
        }

        Ok(matches)
    }

    /// Turn matches into the final output, synthesizing an answer if enabled
    pub async fn assemble(&self, request: &QueryRequest, matches: Vec<Match>) -> Result<QueryOutput> {
        match &self.synthesizer {
            None => Ok(QueryOutput::Matches(matches)),
            Some(synthesizer) => {
                let answer = self.synthesize(synthesizer, request, &matches).await?;
                Ok(QueryOutput::Answer(answer))
            }
        }
    }

    async fn synthesize(
        &self,
        synthesizer: &Synthesizer,
        request: &QueryRequest,
        matches: &[Match],
    ) -> Result<String> {
        let chat = build_chat_request(&synthesizer.settings, &request.text, matches)?;

        tracing::info!(
            provider = synthesizer.client.name(),
            model = %chat.model,
            "Calling chat completion"
        );
        let answer = synthesizer.client.complete(&chat).await?;
        tracing::debug!("Answer received: {} chars", answer.len());

        Ok(answer)
    }
}

/// Build the chat request grounding the answer in `matches`
pub fn build_chat_request(
    settings: &SynthesisSettings,
    question: &str,
    matches: &[Match],
) -> Result<ChatRequest> {
    let context = serde_json::to_string(matches)
        .map_err(|e| MiaError::Synthesis(format!("Failed to serialize context: {e}")))?;

    Ok(ChatRequest {
        model: settings.model.clone(),
        messages: vec![
            ChatMessage::system(format!("{COMPANION_INSTRUCTION} {context}")),
            ChatMessage::user(question),
        ],
        seed: settings.seed,
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    })
}

// ============================================================================
// Tests
// ============================================================================
