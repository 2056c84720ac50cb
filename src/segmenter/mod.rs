//! PDF loading and chunking.
//!
//! The segmenter turns a PDF on disk into ordered [`DocumentChunk`]s. Extraction runs on the
//! blocking pool because `pdf-extract` is synchronous and may panic on malformed input; both
//! extractor errors and panics surface as [`SegmentError::Extraction`]. A document without any
//! extractable text yields [`SegmentOutcome::Empty`], which callers must treat differently from
//! a failure.

mod chunking;

pub use chunking::ChunkingError;

use crate::config::Config;
use crate::config::ChunkLengthUnit;
use chunking::{LengthCounter, build_length_counter, chunk_text};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Separator placed between page texts before splitting.
const PAGE_SEPARATOR: &str = "\n\n";

/// A contiguous span of extracted text tagged with its source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// Raw chunk text.
    pub text: String,
    /// File name the chunk was extracted from; the retrieval filter key.
    pub source: String,
    /// Zero-based position of the chunk within its document.
    pub index: usize,
}

/// Result of segmenting a document that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// The document contained no extractable text.
    Empty,
    /// Ordered, non-empty list of chunks.
    Chunks(Vec<DocumentChunk>),
}

/// Errors raised while loading or splitting a document.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The PDF could not be read or parsed.
    #[error("failed to extract text from {path}: {message}")]
    Extraction {
        /// Path of the offending file.
        path: PathBuf,
        /// Extractor diagnostic.
        message: String,
    },
    /// Extracted text could not be split.
    #[error("failed to split document: {0}")]
    Chunking(#[from] ChunkingError),
}

/// Loads PDFs and splits their text into overlapping chunks.
pub struct Segmenter {
    chunk_size: usize,
    chunk_overlap: usize,
    counter: LengthCounter,
}

impl Segmenter {
    /// Build a segmenter with explicit limits.
    ///
    /// `model` selects the tiktoken encoding when `unit` is [`ChunkLengthUnit::Tokens`].
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        unit: ChunkLengthUnit,
        model: &str,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            counter: build_length_counter(unit, model)?,
        })
    }

    /// Build a segmenter from the chunking section of the configuration.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        Self::new(
            config.chunk_size,
            config.chunk_overlap,
            config.chunk_length_unit,
            &config.embedding_model,
        )
    }

    /// Load the PDF at `path` and split it into chunks tagged with `source`.
    pub async fn segment(&self, path: &Path, source: &str) -> Result<SegmentOutcome, SegmentError> {
        let pages = extract_pages(path).await?;
        tracing::debug!(path = %path.display(), pages = pages.len(), "Extracted PDF pages");
        if pages.is_empty() {
            tracing::warn!(path = %path.display(), "No pages loaded; the PDF might be empty or corrupted");
            return Ok(SegmentOutcome::Empty);
        }

        let outcome = self.split_pages(&pages, source)?;
        if let SegmentOutcome::Chunks(chunks) = &outcome {
            tracing::info!(
                path = %path.display(),
                chunks = chunks.len(),
                "Processed PDF into chunks"
            );
        }
        Ok(outcome)
    }

    /// Join page texts and split them into chunks tagged with `source`.
    pub fn split_pages<S>(&self, pages: &[S], source: &str) -> Result<SegmentOutcome, ChunkingError>
    where
        S: AsRef<str>,
    {
        let text = pages
            .iter()
            .map(|page| page.as_ref().trim())
            .filter(|page| !page.is_empty())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR);

        let chunks = chunk_text(&text, self.chunk_size, self.chunk_overlap, &self.counter)?;
        if chunks.is_empty() {
            return Ok(SegmentOutcome::Empty);
        }

        Ok(SegmentOutcome::Chunks(
            chunks
                .into_iter()
                .enumerate()
                .map(|(index, text)| DocumentChunk {
                    text,
                    source: source.to_string(),
                    index,
                })
                .collect(),
        ))
    }
}

async fn extract_pages(path: &Path) -> Result<Vec<String>, SegmentError> {
    let owned = path.to_path_buf();
    let joined = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned))
        .await;

    match joined {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(error)) => Err(SegmentError::Extraction {
            path: path.to_path_buf(),
            message: error.to_string(),
        }),
        Err(join_error) => Err(SegmentError::Extraction {
            path: path.to_path_buf(),
            message: format!("extractor aborted: {join_error}"),
        }),
    }
}
