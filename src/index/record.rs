//! Persisted chunk records and the helpers used to stamp them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Persisted form of a chunk inside the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Random UUID assigned at ingestion.
    pub id: String,
    /// File name the chunk was ingested under; the only retrieval filter key.
    pub source: String,
    /// Chunk text returned by retrieval.
    pub text: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// SHA-256 of `text`, hex encoded.
    pub chunk_hash: String,
    /// RFC 3339 ingestion time.
    pub timestamp: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

impl VectorRecord {
    /// Stamp a new record for `text` under `source`.
    pub fn new(
        source: &str,
        text: String,
        chunk_index: usize,
        vector: Vec<f32>,
        timestamp: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            chunk_hash: compute_chunk_hash(&text),
            text,
            chunk_index,
            timestamp: timestamp.to_string(),
            vector,
        }
    }
}

/// A stored chunk text with its similarity to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Chunk text.
    pub text: String,
    /// Cosine similarity; higher is closer.
    pub score: f32,
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for record storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
