//! MIA Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout MIA query:
//! - Request normalization (raw body → `QueryRequest`)
//! - Match and metadata types returned by the vector index
//! - The uniform response envelope
//! - Common error types
//! - Provider traits (embedding, vector index, chat completion)
//! - Configuration management
//! - Tracing subscriber setup

pub mod config;
pub mod envelope;
pub mod request;
pub mod telemetry;

pub use config::{
    AppConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig, PineconeConfig, RagConfig,
    ServerConfig,
};
pub use envelope::{QueryOutput, ResponseEnvelope, SUCCESS_MESSAGE};
pub use request::{normalize, QueryRequest, RawRequest};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for MIA operations
#[derive(Error, Debug)]
pub enum MiaError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MiaError>;

impl From<ConfigError> for MiaError {
    fn from(err: ConfigError) -> Self {
        MiaError::Configuration(err.to_string())
    }
}

// ============================================================================
// Matches
// ============================================================================

/// A single metadata value attached to an index entry
///
/// Timestamps are kept typed so they can be rendered as ISO-8601 on the
/// way out; lists and nested objects are carried as raw JSON.
///
/// Index payloads decode through `From<serde_json::Value>` and never yield
/// `Timestamp`: Pinecone metadata only holds strings, numbers, booleans and
/// string lists, so a stored date arrives as `String`. Typed timestamps
/// come from values built in code via `From<DateTime<Utc>>`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Other(serde_json::Value),
}

impl MetadataValue {
    /// JSON-safe form of this value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Timestamp(ts) => serde_json::Value::String(format_timestamp(ts)),
            Self::Other(v) => v.clone(),
        }
    }

    /// Borrow the string payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Number(n) => n.serialize(serializer),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
            Self::Other(v) => v.serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for MetadataValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::Bool(b) => Self::Bool(b),
            other => Self::Other(other),
        }
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(Self::Number)
            .unwrap_or(Self::Other(serde_json::Value::Null))
    }
}

/// Render a timestamp as RFC 3339 in UTC (`Z` suffix)
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Metadata stored alongside a vector
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A ranked match returned by the vector index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    /// Provider-assigned identifier
    pub id: String,

    /// Similarity score (higher is more similar)
    pub score: f32,

    /// Metadata stored with the vector
    pub metadata: Metadata,
}

impl Match {
    /// Create a match without metadata
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Provider Request Types
// ============================================================================

/// Nearest-neighbour query sent to a vector index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    /// Query embedding
    pub vector: Vec<f32>,

    /// Number of neighbours to return
    pub top_k: usize,

    /// Return stored metadata with each match
    pub include_metadata: bool,

    /// Provider-defined metadata filter, passed through untouched
    pub filter: Option<serde_json::Value>,
}

impl IndexQuery {
    /// Create a query that includes metadata and applies no filter
    pub fn new(vector: Vec<f32>, top_k: usize) -> Self {
        Self {
            vector,
            top_k,
            include_metadata: true,
            filter: None,
        }
    }

    /// Set the metadata filter
    pub fn with_filter(mut self, filter: Option<serde_json::Value>) -> Self {
        self.filter = filter;
        self
    }
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Chat-completion request with fixed sampling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Model name
    pub model: String,

    /// Ordered conversation
    pub messages: Vec<ChatMessage>,

    /// Sampling seed for reproducible output
    pub seed: Option<i64>,

    /// Completion token ceiling
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for embedding generation
#[async_trait::async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MiaError::Embedding("No embedding returned".to_string()))
    }

    /// Generate embeddings for multiple texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}

/// Trait for vector similarity indexes
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return the nearest neighbours, ordered by descending score
    async fn query(&self, query: &IndexQuery) -> Result<Vec<Match>>;

    /// Index name for logging
    fn name(&self) -> &str;
}

/// Trait for chat-completion clients
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Run a completion and return the first choice's text
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
