//! MIA Configuration Management
//!
//! Handles configuration from environment variables and config files,
//! with defaults that mirror the hosted providers' usual settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Embedding and chat-completion providers
    pub llm: LlmConfig,

    /// Pinecone vector index
    pub pinecone: PineconeConfig,

    /// Query pipeline configuration
    pub rag: RagConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_lookup(&lookup)?;
        Ok(config)
    }

    fn apply_lookup<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", port)?;
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = parse_value("REQUEST_TIMEOUT_SECS", secs)?;
        }

        // CORS origins (comma-separated)
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // LLM / embeddings
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Some(tokens) = lookup("LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_value("LLM_MAX_TOKENS", tokens)?;
        }
        if let Some(temp) = lookup("LLM_TEMPERATURE") {
            self.llm.temperature = parse_value("LLM_TEMPERATURE", temp)?;
        }
        if let Some(seed) = lookup("LLM_SEED") {
            self.llm.seed = Some(parse_value("LLM_SEED", seed)?);
        }
        if let Some(secs) = lookup("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_value("LLM_TIMEOUT_SECS", secs)?;
        }

        // Pinecone
        if let Some(key) = lookup("PINECONE_API_KEY") {
            self.pinecone.api_key = Some(key);
        }
        if let Some(env) = lookup("PINECONE_ENV_KEY") {
            self.pinecone.environment = Some(env);
        }
        if let Some(name) = lookup("PINECONE_INDEX_NAME") {
            self.pinecone.index_name = Some(name);
        }
        if let Some(host) = lookup("PINECONE_INDEX_HOST") {
            self.pinecone.index_host = Some(host);
        }
        if let Some(namespace) = lookup("PINECONE_NAMESPACE") {
            self.pinecone.namespace = Some(namespace);
        }

        // Pipeline
        if let Some(flag) = lookup("SYNTHESIZE_ANSWER") {
            self.rag.synthesize_answer = parse_bool("SYNTHESIZE_ANSWER", flag)?;
        }
        if let Some(text) = lookup("DEFAULT_QUERY_TEXT") {
            self.rag.default_query_text = text;
        }
        if let Some(top_k) = lookup("DEFAULT_TOP_K") {
            self.rag.default_top_k = parse_value("DEFAULT_TOP_K", top_k)?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(())
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_lookup(&|key: &str| std::env::var(key).ok())?;
        Ok(self)
    }

    /// Check that everything needed at startup is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pinecone.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingRequired("PINECONE_API_KEY".to_string()));
        }
        if self.pinecone.index_host.is_none() {
            if self.pinecone.index_name.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingRequired(
                    "PINECONE_INDEX_NAME".to_string(),
                ));
            }
            if self.pinecone.environment.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingRequired(
                    "PINECONE_ENV_KEY or PINECONE_INDEX_HOST".to_string(),
                ));
            }
        }
        if self.llm.provider.requires_api_key()
            && self.llm.openai_api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::MissingRequired("OPENAI_API_KEY".to_string()));
        }
        if self.rag.default_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DEFAULT_TOP_K".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***".to_string());
        let mut copy = self.clone();
        copy.llm.openai_api_key = mask(&self.llm.openai_api_key);
        copy.pinecone.api_key = mask(&self.pinecone.api_key);
        copy
    }
}

fn parse_value<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

fn parse_bool(key: &str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 120,
            max_body_size: 1024 * 1024, // 1MB
            cors_enabled: true,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Embedding and chat-completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider to use for embeddings and chat
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for OpenAI-compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Chat model name
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Sampling seed
    pub seed: Option<i64>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4-1106-preview".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            seed: Some(48),
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl LlmProvider {
    /// Whether the provider needs `OPENAI_API_KEY`
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI)
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Pinecone index configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PineconeConfig {
    /// API key
    pub api_key: Option<String>,

    /// Legacy environment (e.g. `us-west1-gcp`), used to resolve the host
    pub environment: Option<String>,

    /// Index name
    pub index_name: Option<String>,

    /// Data-plane host; skips environment-based resolution when set
    pub index_host: Option<String>,

    /// Namespace to query
    pub namespace: Option<String>,
}

/// Query pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Query text used when the request carries none
    pub default_query_text: String,

    /// Number of matches when the request carries no top-k
    pub default_top_k: usize,

    /// Feed retrieved context to a chat completion
    pub synthesize_answer: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_query_text: "Default input text if not provided".to_string(),
            default_top_k: 3,
            synthesize_answer: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
