use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// The provider could not be reached or timed out.
    #[error("Embedding provider unreachable: {0}")]
    Transport(String),
    /// Provider answered with a non-success status.
    #[error("Embedding provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body of the failing response.
        body: String,
    },
    /// Provider response did not carry a usable vector.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Vector length differs from the configured collection dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the collection.
        expected: usize,
        /// Dimension returned by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError>;
}

/// Embedding client backed by the Ollama `/api/embeddings` endpoint.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl OllamaEmbeddingClient {
    /// Construct a client for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("pbs-rag/embedding")
            .build()
            .map_err(|error| EmbeddingClientError::Transport(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            dimension,
            timeout,
        })
    }

    /// Build a client from the runtime configuration.
    pub fn from_config(config: &Config) -> Result<Self, EmbeddingClientError> {
        Self::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
            config.embedding_timeout,
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        tracing::debug!(model = %self.model, chars = text.chars().count(), "Requesting embedding");

        let response = self
            .http
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::Transport(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::UnexpectedStatus { status, body });
        }

        let body: OllamaEmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        let vector = body
            .embedding
            .filter(|vector| !vector.is_empty())
            .ok_or_else(|| {
                EmbeddingClientError::InvalidResponse("response carried no embedding".into())
            })?;

        if vector.len() != self.dimension {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        Ok(vector)
    }
}
