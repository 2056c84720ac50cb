//! Qdrant-backed vector store.

mod client;
mod types;

pub use client::QdrantService;
pub use types::{QdrantError, ScoredPoint};

use super::record::{ScoredChunk, VectorRecord};
use super::{IndexError, VectorBackend};
use async_trait::async_trait;
use client::source_filter;
use serde_json::Value;

/// Vector backend storing records in a single Qdrant collection.
pub struct QdrantBackend {
    service: QdrantService,
    collection: String,
}

impl QdrantBackend {
    /// Connect to Qdrant and make sure `collection` and its payload indexes exist.
    pub async fn connect(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        vector_size: u64,
    ) -> Result<Self, QdrantError> {
        let service = QdrantService::new(url, api_key)?;
        tracing::debug!(collection, vector_size, "Ensuring Qdrant collection");
        service
            .create_collection_if_not_exists(collection, vector_size)
            .await?;
        service.ensure_payload_indexes(collection).await?;
        tracing::info!(collection, "Qdrant collection ready");
        Ok(Self {
            service,
            collection: collection.to_string(),
        })
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn insert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError> {
        Ok(self.service.index_points(&self.collection, records).await?)
    }

    async fn search(
        &self,
        vector: &[f32],
        source: &str,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let points = self
            .service
            .search_points(&self.collection, vector, source_filter(source), limit)
            .await?;

        Ok(points
            .into_iter()
            .filter_map(|point| {
                let text = match point.payload?.remove("text") {
                    Some(Value::String(text)) => text,
                    _ => return None,
                };
                Some(ScoredChunk {
                    text,
                    score: point.score,
                })
            })
            .collect())
    }

    async fn count(&self, source: &str) -> Result<usize, IndexError> {
        Ok(self
            .service
            .count_points(&self.collection, source_filter(source))
            .await?)
    }
}
