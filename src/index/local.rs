//! File-backed vector store.
//!
//! Records are appended as JSON lines to `<directory>/<collection>.jsonl` and mirrored in
//! memory; search is an exact cosine-similarity scan over the records of one source. The file
//! is only ever appended to, so a record survives restarts once `insert` returns.

use super::record::{ScoredChunk, VectorRecord};
use super::{IndexError, VectorBackend};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum LocalStoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A persisted line could not be decoded.
    #[error("corrupt record at {path}:{line}: {source}")]
    Corrupt {
        /// Backing file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Decoding error.
        #[source]
        source: serde_json::Error,
    },
    /// A record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Vector store persisted as JSON lines under the vector store directory.
pub struct LocalBackend {
    path: PathBuf,
    records: RwLock<Vec<VectorRecord>>,
}

impl LocalBackend {
    /// Open (or create) the store for `collection` inside `directory`, loading existing records.
    pub async fn open(directory: &Path, collection: &str) -> Result<Self, LocalStoreError> {
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|source| LocalStoreError::Io {
                path: directory.to_path_buf(),
                source,
            })?;
        let path = directory.join(format!("{collection}.jsonl"));
        let records = load_records(&path).await?;
        tracing::info!(path = %path.display(), records = records.len(), "Opened local vector store");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, records: &[VectorRecord]) -> Result<(), LocalStoreError> {
        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let io_error = |source: std::io::Error| LocalStoreError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error)?;
        let committed = file.metadata().await.map_err(io_error)?.len();

        let written = match file.write_all(&buffer).await {
            Ok(()) => file.flush().await,
            Err(error) => Err(error),
        };
        if let Err(error) = written {
            // Roll back a partial line so later appends start on a clean line.
            if let Err(rollback) = file.set_len(committed).await {
                tracing::error!(path = %self.path.display(), error = %rollback, "Failed to roll back partial append");
            }
            return Err(io_error(error));
        }
        Ok(())
    }
}

async fn load_records(path: &Path) -> Result<Vec<VectorRecord>, LocalStoreError> {
    let io_error = |source: std::io::Error| LocalStoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io_error(source)),
    };

    if !contents.is_empty() && !contents.ends_with('\n') {
        repair_unterminated_tail(path, &mut contents)
            .await
            .map_err(io_error)?;
    }

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| LocalStoreError::Corrupt {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })
        })
        .collect()
}

/// Fix a final line left without its newline by an interrupted append.
///
/// A tail that still decodes is terminated; a torn fragment is truncated away.
async fn repair_unterminated_tail(path: &Path, contents: &mut String) -> std::io::Result<()> {
    let start = contents.rfind('\n').map_or(0, |idx| idx + 1);

    if serde_json::from_str::<VectorRecord>(&contents[start..]).is_ok() {
        let mut file = tokio::fs::OpenOptions::new().append(true).open(path).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        contents.push('\n');
    } else {
        tracing::warn!(
            path = %path.display(),
            bytes = contents.len() - start,
            "Discarding torn record at end of local vector store"
        );
        let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        file.set_len(start as u64).await?;
        contents.truncate(start);
    }
    Ok(())
}

#[async_trait]
impl VectorBackend for LocalBackend {
    async fn insert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }
        let count = records.len();
        // Held across the append so memory and file never disagree on order.
        let mut guard = self.records.write().await;
        self.append(&records).await?;
        guard.extend(records);
        tracing::debug!(path = %self.path.display(), inserted = count, "Records appended");
        Ok(count)
    }

    async fn search(
        &self,
        vector: &[f32],
        source: &str,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let guard = self.records.read().await;
        let mut hits: Vec<ScoredChunk> = guard
            .iter()
            .filter(|record| record.source == source)
            .map(|record| ScoredChunk {
                text: record.text.clone(),
                score: cosine_similarity(vector, &record.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, source: &str) -> Result<usize, IndexError> {
        let guard = self.records.read().await;
        Ok(guard.iter().filter(|record| record.source == source).count())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: &str, text: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord::new(source, text.into(), 0, vector, "2025-01-01T00:00:00Z")
    }

    #[tokio::test]
    async fn search_is_filtered_by_source_and_ranked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::open(dir.path(), "test").await.expect("open");
        backend
            .insert(vec![
                record("a.pdf", "far", vec![0.0, 1.0]),
                record("a.pdf", "near", vec![1.0, 0.1]),
                record("b.pdf", "other document", vec![1.0, 0.0]),
            ])
            .await
            .expect("insert");

        let hits = backend.search(&[1.0, 0.0], "a.pdf", 4).await.expect("search");
        let texts: Vec<_> = hits.iter().map(|hit| hit.text.as_str()).collect();
        assert_eq!(texts, vec!["near", "far"]);

        let none = backend.search(&[1.0, 0.0], "c.pdf", 4).await.expect("search");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn search_honours_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::open(dir.path(), "test").await.expect("open");
        let records = (0..10)
            .map(|i| record("a.pdf", &format!("chunk {i}"), vec![1.0, i as f32]))
            .collect();
        backend.insert(records).await.expect("insert");

        let hits = backend.search(&[1.0, 0.0], "a.pdf", 4).await.expect("search");
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].text, "chunk 0");
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let backend = LocalBackend::open(dir.path(), "persist").await.expect("open");
            backend
                .insert(vec![record("a.pdf", "kept", vec![1.0, 0.0])])
                .await
                .expect("insert");
        }

        let reopened = LocalBackend::open(dir.path(), "persist").await.expect("reopen");
        assert_eq!(reopened.count("a.pdf").await.expect("count"), 1);
        assert!(reopened.path().ends_with("persist.jsonl"));
    }

    #[tokio::test]
    async fn corrupt_lines_are_reported_with_position() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.jsonl"), "{not json}\n").expect("write");

        let error = LocalBackend::open(dir.path(), "broken").await.err();
        assert!(matches!(error, Some(LocalStoreError::Corrupt { line: 1, .. })));
    }

    #[tokio::test]
    async fn torn_trailing_record_is_discarded_on_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::open(dir.path(), "torn").await.expect("open");
        backend
            .insert(vec![record("a.pdf", "first", vec![1.0, 0.0])])
            .await
            .expect("insert");
        drop(backend);

        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(dir.path().join("torn.jsonl"))
                .expect("open store file");
            file.write_all(br#"{"id":"abc","source":"a.p"#).expect("write fragment");
        }

        let reopened = LocalBackend::open(dir.path(), "torn").await.expect("reopen");
        assert_eq!(reopened.count("a.pdf").await.expect("count"), 1);
        reopened
            .insert(vec![record("a.pdf", "second", vec![0.0, 1.0])])
            .await
            .expect("insert after repair");
        drop(reopened);

        let again = LocalBackend::open(dir.path(), "torn").await.expect("reopen");
        assert_eq!(again.count("a.pdf").await.expect("count"), 2);
    }

    #[tokio::test]
    async fn unterminated_complete_record_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let line = serde_json::to_string(&record("a.pdf", "kept", vec![1.0])).expect("encode");
        std::fs::write(dir.path().join("tail.jsonl"), &line).expect("write");

        let backend = LocalBackend::open(dir.path(), "tail").await.expect("open");
        backend
            .insert(vec![record("a.pdf", "next", vec![1.0])])
            .await
            .expect("insert");
        drop(backend);

        let reopened = LocalBackend::open(dir.path(), "tail").await.expect("reopen");
        assert_eq!(reopened.count("a.pdf").await.expect("count"), 2);
    }

    #[tokio::test]
    async fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("nested").join("store");
        LocalBackend::open(&nested, "test").await.expect("open");
        assert!(nested.is_dir());
    }

    #[test]
    fn cosine_similarity_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
