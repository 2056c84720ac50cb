//! Remote LLM completion clients.
//!
//! The answer generator talks to a [`CompletionClient`]; adapters exist for OpenAI-compatible
//! chat APIs (Groq by default) and for a local Ollama runtime. Both issue plain HTTP requests
//! through `reqwest` with the client's default timeouts and never retry.

mod ollama;
mod openai;

pub use ollama::OllamaCompletionClient;
pub use openai::OpenAiCompatibleClient;

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Client could not be constructed from configuration.
    #[error("Failed to initialize completion client: {0}")]
    Initialization(String),
    /// Provider could not be reached.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response (authentication, rate limit, server error).
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Fully rendered prompt sent as one user message.
    pub prompt: String,
    /// Sampling temperature; `0.0` for deterministic answers.
    pub temperature: f32,
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate text for the request using the client's configured model.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Build a completion client based on configuration.
pub fn build_completion_client(
    config: &Config,
) -> Result<Arc<dyn CompletionClient>, CompletionError> {
    tracing::info!(
        provider = ?config.llm_provider,
        model = %config.llm_model,
        "Initializing completion client"
    );
    let client: Arc<dyn CompletionClient> = match config.llm_provider {
        LlmProvider::Groq | LlmProvider::OpenAI => {
            let api_key = config.llm_api_key.clone().ok_or_else(|| {
                CompletionError::Initialization("LLM_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiCompatibleClient::new(
                &config.llm_api_url,
                api_key,
                config.llm_model.clone(),
            )?)
        }
        LlmProvider::Ollama => Arc::new(OllamaCompletionClient::new(
            &config.llm_api_url,
            config.llm_model.clone(),
        )?),
    };
    Ok(client)
}
