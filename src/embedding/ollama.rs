//! Embeddings served by a local Ollama runtime.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Embedding client backed by Ollama's `/api/embed` endpoint.
pub struct OllamaEmbeddingClient {
    client: Ollama,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Construct a client for the runtime at `base_url` using `model`.
    pub fn new(base_url: &str, model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
        }
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        tracing::debug!(model = %self.model, texts = expected, "Requesting Ollama embeddings");
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|error| {
                EmbeddingClientError::GenerationFailed(format!(
                    "Ollama embedding request failed: {error}"
                ))
            })?;

        if response.embeddings.len() != expected {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {} embeddings for {expected} inputs",
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            return (url[..colon_pos].to_string(), port);
        }
    }
    (url.to_string(), DEFAULT_OLLAMA_PORT)
}
