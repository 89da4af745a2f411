//! Text generation through a local LLM runtime.
//!
//! One client serves both upload summaries and chat answers; callers pick the timeout per
//! request because answer generation runs far longer than a one-line summary.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was unreachable or the request timed out.
    #[error("Generation provider unavailable: {0}")]
    Transport(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Request payload passed to the generation provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Fully assembled prompt.
    pub prompt: String,
    /// Upper bound on how long the provider may take.
    pub timeout: Duration,
}

/// Interface implemented by text generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a completion for the prompt using the configured model.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Generation client backed by the Ollama `/api/generate` endpoint.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerationClient {
    /// Construct a client for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, GenerationClientError> {
        let http = Client::builder()
            .user_agent("pbs-rag/generation")
            .build()
            .map_err(|error| GenerationClientError::Transport(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// Build a client from the runtime configuration.
    pub fn from_config(config: &Config) -> Result<Self, GenerationClientError> {
        Self::new(config.ollama_url.clone(), config.llm_model.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default = "default_done")]
    done: bool,
}

fn default_done() -> bool {
    true
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
        });

        let response = self
            .http
            .post(self.endpoint())
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::Transport(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::Transport(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        body.response
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                GenerationClientError::InvalidResponse("missing `response` field".into())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.into(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = OllamaGenerationClient::new(server.base_url(), "solar:10.7b").expect("client");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body(json!({
                        "model": "solar:10.7b",
                        "prompt": "Summarize",
                        "stream": false
                    }));
                then.status(200).json_body(json!({
                    "response": "  Summary text\n",
                    "done": true
                }));
            })
            .await;

        let text = client.generate(request("Summarize")).await.expect("text");

        mock.assert();
        assert_eq!(text, "Summary text");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaGenerationClient::new(server.base_url(), "solar:10.7b").expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client
            .generate(request("Summarize"))
            .await
            .expect_err("error response");

        assert!(matches!(
            error,
            GenerationClientError::GenerationFailed(message) if message.contains("500")
        ));
    }

    #[tokio::test]
    async fn missing_response_field_is_a_format_error() {
        let server = MockServer::start_async().await;
        let client = OllamaGenerationClient::new(server.base_url(), "solar:10.7b").expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({ "done": true }));
            })
            .await;

        let error = client
            .generate(request("Summarize"))
            .await
            .expect_err("format error");

        assert!(matches!(error, GenerationClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start_async().await;
        let client = OllamaGenerationClient::new(server.base_url(), "solar:10.7b").expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .delay(Duration::from_millis(800))
                    .json_body(json!({ "response": "late", "done": true }));
            })
            .await;

        let error = client
            .generate(GenerationRequest {
                prompt: "Summarize".into(),
                timeout: Duration::from_millis(100),
            })
            .await
            .expect_err("timeout");

        assert!(matches!(error, GenerationClientError::Transport(_)));
    }
}
