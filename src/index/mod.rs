//! Vector index: embeddings plus a pluggable storage backend.
//!
//! [`VectorIndex`] owns the embedding client and a [`VectorBackend`]. It tags every ingested
//! chunk with the file name it was uploaded under and restricts retrieval to exactly that
//! name; there is no cross-document retrieval.

pub mod local;
pub mod qdrant;
mod record;

pub use local::{LocalBackend, LocalStoreError};
pub use qdrant::{QdrantBackend, QdrantError};
pub use record::{ScoredChunk, VectorRecord, compute_chunk_hash};

use crate::config::{Config, VectorStoreBackend};
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::segmenter::DocumentChunk;
use async_trait::async_trait;
use record::current_timestamp_rfc3339;
use std::sync::Arc;
use thiserror::Error;

/// Number of chunks returned by [`VectorIndex::retrieve`].
pub const DEFAULT_TOP_K: usize = 4;

/// Errors raised by the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding provider failed to return vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Local store failed to read or persist records.
    #[error("Local vector store failed: {0}")]
    Local(#[from] LocalStoreError),
    /// Qdrant request returned an error.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Provider returned a different number of vectors than texts submitted.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured embedding dimension.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Storage seam implemented by the local and Qdrant stores.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Persist records, returning how many were stored.
    async fn insert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError>;

    /// Return up to `limit` chunks whose `source` equals `source`, most similar first.
    async fn search(
        &self,
        vector: &[f32],
        source: &str,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Number of records stored under `source`.
    async fn count(&self, source: &str) -> Result<usize, IndexError>;
}

/// Persistent mapping from embedding vectors to chunk text and source metadata.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingClient>,
    backend: Arc<dyn VectorBackend>,
    dimension: usize,
}

impl VectorIndex {
    /// Assemble an index from its parts.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        backend: Arc<dyn VectorBackend>,
        dimension: usize,
    ) -> Self {
        Self {
            embedder,
            backend,
            dimension,
        }
    }

    /// Open the backend selected by configuration.
    pub async fn open(
        config: &Config,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, IndexError> {
        let backend: Arc<dyn VectorBackend> = match config.vector_store_backend {
            VectorStoreBackend::Local => Arc::new(
                LocalBackend::open(
                    &config.vector_store_directory,
                    &config.vector_store_collection,
                )
                .await?,
            ),
            VectorStoreBackend::Qdrant => {
                let url = config.qdrant_url.as_deref().ok_or_else(|| {
                    QdrantError::InvalidUrl("QDRANT_URL is not set".to_string())
                })?;
                Arc::new(
                    QdrantBackend::connect(
                        url,
                        config.qdrant_api_key.clone(),
                        &config.vector_store_collection,
                        config.embedding_dimension as u64,
                    )
                    .await?,
                )
            }
        };
        Ok(Self::new(embedder, backend, config.embedding_dimension))
    }

    /// Embed and store `chunks` under `source_label`, returning the number of records added.
    ///
    /// Every chunk is embedded before anything is written, so an embedding failure leaves the
    /// store untouched.
    pub async fn ingest(
        &self,
        chunks: Vec<DocumentChunk>,
        source_label: &str,
    ) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::CountMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }

        let now = current_timestamp_rfc3339();
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                VectorRecord::new(source_label, chunk.text, chunk.index, vector, &now)
            })
            .collect();

        let inserted = self.backend.insert(records).await?;
        tracing::info!(source = source_label, inserted, "Chunks ingested");
        Ok(inserted)
    }

    /// Return the texts of the chunks stored under `source_label` closest to `query_text`.
    ///
    /// An unknown source yields an empty list rather than an error.
    pub async fn retrieve(
        &self,
        query_text: &str,
        source_label: &str,
    ) -> Result<Vec<String>, IndexError> {
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query_text.to_string()])
            .await?;
        if vectors.len() != 1 {
            return Err(IndexError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        let vector = vectors.remove(0);
        self.check_dimension(&vector)?;

        let hits = self
            .backend
            .search(&vector, source_label, DEFAULT_TOP_K)
            .await?;
        tracing::debug!(
            source = source_label,
            hits = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "Retrieved chunks"
        );
        Ok(hits.into_iter().map(|hit| hit.text).collect())
    }

    /// Number of records stored under `source_label`.
    pub async fn count(&self, source_label: &str) -> Result<usize, IndexError> {
        self.backend.count(source_label).await
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }
}
