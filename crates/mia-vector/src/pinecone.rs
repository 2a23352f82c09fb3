//! Pinecone implementation for similarity search
//!
//! Talks to the Pinecone data plane over REST. The index host is either
//! configured directly or resolved once from the legacy environment
//! scheme (`{index}-{project}.svc.{environment}.pinecone.io`).
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use mia_core::{IndexQuery, Match, Metadata, MetadataValue, MiaError, PineconeConfig, Result, VectorIndex};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const API_KEY_HEADER: &str = "Api-Key";

/// Pinecone index client
pub struct PineconeIndex {
    client: Client,
    api_key: String,
    host: String,
    name: String,
    namespace: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PineconeQueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PineconeQueryResponse {
    #[serde(default)]
    matches: Vec<ScoredVector>,
}

#[derive(Debug, Deserialize)]
struct ScoredVector {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl From<ScoredVector> for Match {
    fn from(scored: ScoredVector) -> Self {
        let metadata: Metadata = scored
            .metadata
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, MetadataValue::from(v)))
            .collect();

        Match {
            id: scored.id,
            score: scored.score,
            metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WhoAmIResponse {
    project_name: String,
}

impl PineconeIndex {
    /// Create a client for a known data-plane host
    pub fn new(api_key: impl Into<String>, host: impl AsRef<str>, name: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            host: normalize_host(host.as_ref()),
            name: name.into(),
            namespace: None,
        }
    }

    /// Query within a namespace
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    /// Use a preconfigured HTTP client
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Data-plane host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Build from config, resolving the host if only an environment is given
    pub async fn connect(config: &PineconeConfig, timeout_secs: u64) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| MiaError::Configuration("Pinecone API key required".to_string()))?;
        let client = crate::http_client(timeout_secs)?;

        let name = config.index_name.clone().unwrap_or_default();
        let host = match (&config.index_host, &config.environment) {
            (Some(host), _) => host.clone(),
            (None, Some(environment)) => {
                if name.is_empty() {
                    return Err(MiaError::Configuration(
                        "Pinecone index name required".to_string(),
                    ));
                }
                let project = whoami(&client, &controller_url(environment), &api_key).await?;
                legacy_host(&name, &project, environment)
            }
            (None, None) => {
                return Err(MiaError::Configuration(
                    "Pinecone index host or environment required".to_string(),
                ))
            }
        };

        tracing::info!(index = %name, host = %host, "Pinecone index resolved");

        Ok(Self::new(api_key, host, name)
            .with_namespace(config.namespace.clone())
            .with_http_client(client))
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, query: &IndexQuery) -> Result<Vec<Match>> {
        let request = PineconeQueryRequest {
            vector: &query.vector,
            top_k: query.top_k,
            include_metadata: query.include_metadata,
            include_values: false,
            filter: query.filter.as_ref(),
            namespace: self.namespace.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/query", self.host))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MiaError::Retrieval(format!("Pinecone query request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MiaError::Retrieval(format!(
                "Pinecone query error ({status}): {error_text}"
            )));
        }

        let result: PineconeQueryResponse = response
            .json()
            .await
            .map_err(|e| MiaError::Retrieval(format!("Failed to parse query response: {e}")))?;

        Ok(result.matches.into_iter().map(Match::from).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Controller endpoint for a legacy environment
pub fn controller_url(environment: &str) -> String {
    format!("https://controller.{environment}.pinecone.io")
}

/// Data-plane host for a legacy (environment-scoped) index
pub fn legacy_host(index_name: &str, project: &str, environment: &str) -> String {
    format!("https://{index_name}-{project}.svc.{environment}.pinecone.io")
}

/// Look up the project name owning `api_key`
pub async fn whoami(client: &Client, controller: &str, api_key: &str) -> Result<String> {
    let response = client
        .get(format!("{}/actions/whoami", controller.trim_end_matches('/')))
        .header(API_KEY_HEADER, api_key)
        .send()
        .await
        .map_err(|e| MiaError::Configuration(format!("Pinecone whoami request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(MiaError::Configuration(format!(
            "Pinecone whoami error ({status}): {error_text}"
        )));
    }

    let result: WhoAmIResponse = response
        .json()
        .await
        .map_err(|e| MiaError::Configuration(format!("Failed to parse whoami response: {e}")))?;

    Ok(result.project_name)
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}
