//! OpenAI-compatible chat completions (Groq, OpenAI).

use super::{CompletionClient, CompletionError, CompletionRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Chat completion client for Groq, OpenAI and API-compatible providers.
pub struct OpenAiCompatibleClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleClient {
    /// Construct a client for the API rooted at `base_url` (e.g. `https://api.groq.com/openai/v1`).
    pub fn new(base_url: &str, api_key: String, model: String) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .user_agent("pdf-rag/completion")
            .build()
            .map_err(|error| CompletionError::Initialization(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
            "temperature": request.temperature,
            "stream": false,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode chat response: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| CompletionError::InvalidResponse("response contained no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(
            &server.base_url(),
            "gsk-test".into(),
            "llama-3.1-8b-instant".into(),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn sends_single_user_message_at_zero_temperature() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer gsk-test")
                    .json_body(json!({
                        "model": "llama-3.1-8b-instant",
                        "messages": [{ "role": "user", "content": "What is Rust?" }],
                        "temperature": 0.0,
                        "stream": false
                    }));
                then.status(200).json_body(json!({
                    "id": "chatcmpl-1",
                    "choices": [
                        {
                            "index": 0,
                            "message": { "role": "assistant", "content": "  A language.\n" },
                            "finish_reason": "stop"
                        }
                    ]
                }));
            })
            .await;

        let answer = client_for(&server)
            .complete(CompletionRequest {
                prompt: "What is Rust?".into(),
                temperature: 0.0,
            })
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(answer, "A language.");
    }

    #[tokio::test]
    async fn rate_limit_is_reported_as_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let error = client_for(&server)
            .complete(CompletionRequest {
                prompt: "hi".into(),
                temperature: 0.0,
            })
            .await
            .unwrap_err();

        assert!(
            matches!(error, CompletionError::GenerationFailed(ref message) if message.contains("429"))
        );
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client_for(&server)
            .complete(CompletionRequest {
                prompt: "hi".into(),
                temperature: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, CompletionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_provider_is_reported() {
        let client = OpenAiCompatibleClient::new("http://127.0.0.1:1", "key".into(), "m".into())
            .expect("client");
        let error = client
            .complete(CompletionRequest {
                prompt: "hi".into(),
                temperature: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, CompletionError::ProviderUnavailable(_)));
    }
}
