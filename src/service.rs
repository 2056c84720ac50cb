//! RAG service coordinating segmentation, indexing and answer generation.

use crate::{
    answer::{AnswerError, AnswerGenerator},
    completion::{CompletionError, build_completion_client},
    config::Config,
    embedding::{EmbeddingClientError, build_embedding_client},
    index::{IndexError, VectorIndex},
    metrics::{MetricsSnapshot, ServiceMetrics},
    segmenter::{ChunkingError, SegmentError, SegmentOutcome, Segmenter},
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Result of ingesting an uploaded PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The document had no extractable text; nothing was stored.
    Empty,
    /// Chunks were embedded and stored.
    Indexed {
        /// Number of records added to the index.
        chunk_count: usize,
    },
}

/// Failures raised while ingesting a document.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Text extraction or chunking failed.
    #[error("{0}")]
    Segment(#[from] SegmentError),
    /// Embedding or storage failed.
    #[error("{0}")]
    Index(#[from] IndexError),
}

/// Failures raised while assembling the service at startup.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Chunking configuration was rejected.
    #[error("Invalid chunking configuration: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding client could not be built.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index could not be opened.
    #[error("Failed to open vector index: {0}")]
    Index(#[from] IndexError),
    /// Completion client could not be built.
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Extract, chunk, embed and store the PDF at `path` under `file_name`.
    async fn ingest_pdf(
        &self,
        path: &Path,
        file_name: &str,
    ) -> Result<IngestOutcome, ProcessingError>;

    /// Answer `query` from the chunks stored under `file_name`.
    async fn answer(&self, query: &str, file_name: &str) -> Result<String, AnswerError>;

    /// Current counters for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Long-lived service shared by all requests through an `Arc`.
pub struct RagService {
    segmenter: Segmenter,
    index: Arc<VectorIndex>,
    generator: AnswerGenerator,
    metrics: ServiceMetrics,
}

impl RagService {
    /// Assemble a service from already constructed parts.
    pub fn new(segmenter: Segmenter, index: Arc<VectorIndex>, generator: AnswerGenerator) -> Self {
        Self {
            segmenter,
            index,
            generator,
            metrics: ServiceMetrics::new(),
        }
    }

    /// Build every component selected by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceInitError> {
        let segmenter = Segmenter::from_config(config)?;
        let embedder = build_embedding_client(config)?;
        tracing::info!("Embedding client initialized");
        let index = Arc::new(VectorIndex::open(config, embedder).await?);
        let completion = build_completion_client(config)?;
        let generator = AnswerGenerator::new(index.clone(), completion);
        Ok(Self::new(segmenter, index, generator))
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest_pdf(
        &self,
        path: &Path,
        file_name: &str,
    ) -> Result<IngestOutcome, ProcessingError> {
        let chunks = match self.segmenter.segment(path, file_name).await? {
            SegmentOutcome::Empty => return Ok(IngestOutcome::Empty),
            SegmentOutcome::Chunks(chunks) => chunks,
        };

        let chunk_count = self.index.ingest(chunks, file_name).await?;
        self.metrics.record_document(chunk_count as u64);
        tracing::info!(file_name, chunk_count, "Document indexed");
        Ok(IngestOutcome::Indexed { chunk_count })
    }

    async fn answer(&self, query: &str, file_name: &str) -> Result<String, AnswerError> {
        let answer = self.generator.answer(query, file_name).await?;
        self.metrics.record_query();
        Ok(answer)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionClient, CompletionRequest};
    use crate::config::ChunkLengthUnit;
    use crate::embedding::HashingEmbeddingClient;
    use crate::index::LocalBackend;

    struct EchoClient;

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
            Ok(format!("{} characters of prompt", request.prompt.len()))
        }
    }

    async fn service_in(dir: &Path) -> RagService {
        let backend = LocalBackend::open(dir, "svc").await.expect("backend");
        let index = Arc::new(VectorIndex::new(
            Arc::new(HashingEmbeddingClient::new(16)),
            Arc::new(backend),
            16,
        ));
        let segmenter =
            Segmenter::new(200, 20, ChunkLengthUnit::Characters, "unused").expect("segmenter");
        let generator = AnswerGenerator::new(index.clone(), Arc::new(EchoClient));
        RagService::new(segmenter, index, generator)
    }

    #[tokio::test]
    async fn non_pdf_bytes_fail_extraction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_in(dir.path()).await;
        let path = dir.path().join("fake.pdf");
        tokio::fs::write(&path, b"definitely not a pdf")
            .await
            .expect("write");

        let error = service.ingest_pdf(&path, "fake.pdf").await.unwrap_err();
        assert!(matches!(error, ProcessingError::Segment(_)));
        assert_eq!(service.metrics_snapshot(), MetricsSnapshot::default());
    }

    #[tokio::test]
    async fn answering_counts_queries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service_in(dir.path()).await;

        let answer = service.answer("anything?", "none.pdf").await.expect("answer");
        assert!(answer.ends_with("characters of prompt"));
        assert_eq!(service.metrics_snapshot().queries_answered, 1);
        assert_eq!(service.metrics_snapshot().documents_indexed, 0);
    }
}
