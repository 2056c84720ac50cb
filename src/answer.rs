//! Retrieval-augmented answer generation.
//!
//! Retrieved chunk texts are joined into one context block and substituted into a fixed prompt
//! that restricts the model to that context. An empty retrieval still produces a prompt; the
//! template itself tells the model how to respond when the context lacks the answer.

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::index::{IndexError, VectorIndex};
use std::sync::Arc;
use thiserror::Error;

/// Prompt sent to the completion model; `{context}` and `{question}` are substituted.
pub const RAG_PROMPT_TEMPLATE: &str = "Answer the user's question based only on the following context.
If the context doesn't contain the answer, state \"I don't have enough information from the document to answer that.\"

Context:
{context}

Question:
{question}

Answer:";

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// Retrieval from the vector index failed.
    #[error("{0}")]
    Retrieval(#[from] IndexError),
    /// The completion provider failed.
    #[error("{0}")]
    Completion(#[from] CompletionError),
}

/// Join retrieved chunk texts into a single context block.
pub fn format_context(chunks: &[String]) -> String {
    chunks.join(CONTEXT_SEPARATOR)
}

/// Fill the prompt template with `context` and `question`.
pub fn render_prompt(context: &str, question: &str) -> String {
    RAG_PROMPT_TEMPLATE
        .replacen("{context}", context, 1)
        .replacen("{question}", question, 1)
}

/// Answers questions about one uploaded document at a time.
pub struct AnswerGenerator {
    index: Arc<VectorIndex>,
    client: Arc<dyn CompletionClient>,
}

impl AnswerGenerator {
    /// Pair an index with a completion client.
    pub fn new(index: Arc<VectorIndex>, client: Arc<dyn CompletionClient>) -> Self {
        Self { index, client }
    }

    /// Answer `query` using only chunks stored under `file_name`.
    pub async fn answer(&self, query: &str, file_name: &str) -> Result<String, AnswerError> {
        let chunks = self.index.retrieve(query, file_name).await?;
        tracing::debug!(file_name, retrieved = chunks.len(), "Building answer context");

        let context = format_context(&chunks);
        let prompt = render_prompt(&context, query);
        let answer = self
            .client
            .complete(CompletionRequest {
                prompt,
                temperature: 0.0,
            })
            .await?;
        Ok(answer.trim().to_string())
    }
}
