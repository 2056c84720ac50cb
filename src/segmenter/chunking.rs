//! Recursive chunking helpers.
//!
//! Highlights:
//!
//! - Boundaries: `semchunk-rs` splits on the largest available separator first (blank lines,
//!   then newlines, then whitespace, then punctuation, then characters), so chunks end at
//!   paragraph or line breaks whenever the budget allows.
//! - Length: measured in characters by default, or in tokens of the embedding model's tiktoken
//!   encoding when `CHUNK_LENGTH_UNIT=tokens`.
//! - Overlap: base chunks are packed to `chunk_size - overlap`, then a word-aligned tail of up
//!   to `overlap` units from the previous chunk is prefixed onto the next one. The combined
//!   chunk never exceeds `chunk_size`.

use crate::config::ChunkLengthUnit;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, r50k_base};

/// Counts the length of a text segment in the configured unit.
pub(crate) type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while turning extracted text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunking was configured with an impossible length budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model whose encoding we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Build a length counter for the requested unit.
///
/// `model` only matters for [`ChunkLengthUnit::Tokens`]; unknown models fall back to the
/// `cl100k_base` encoding.
pub(crate) fn build_length_counter(
    unit: ChunkLengthUnit,
    model: &str,
) -> Result<LengthCounter, ChunkingError> {
    match unit {
        ChunkLengthUnit::Characters => Ok(character_counter()),
        ChunkLengthUnit::Tokens => build_tiktoken_counter(model),
    }
}

fn character_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn build_tiktoken_counter(model: &str) -> Result<LengthCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            match encoding_from_name(model) {
                Some(candidate) => candidate,
                None => {
                    tracing::warn!(
                        model,
                        "Falling back to 'cl100k_base' encoding for chunk length"
                    );
                    cl100k_base()
                }
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

/// Split `text` into chunks of at most `chunk_size` units with `overlap` units carried over.
///
/// Returns an empty vector when the input is all whitespace. Whitespace-only chunks are dropped.
pub(crate) fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let effective_overlap = overlap.min(chunk_size - 1);
    let base_budget = chunk_size - effective_overlap;
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        base_budget,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks: Vec<String> = chunker
        .chunk(text)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect();
    Ok(apply_overlap(base_chunks, chunk_size, effective_overlap, counter))
}

/// Prefix each chunk with a length-limited tail of its predecessor.
///
/// Tails are taken from the original (non-overlapped) predecessor so overlap never compounds.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    if chunks.len() < 2 || overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let chunk = match previous.as_deref() {
            Some(prev) => {
                build_overlapped_chunk(prev, &current, overlap, chunk_size, counter)
            }
            None => current.clone(),
        };
        overlapped.push(chunk);
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &LengthCounter,
) -> String {
    let needs_separator = !ends_with_whitespace(previous) && !starts_with_whitespace(current);
    let limit = if needs_separator {
        overlap.saturating_sub(counter.as_ref()(" "))
    } else {
        overlap
    };
    let tail = tail_with_length_limit(previous, limit, counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if needs_separator {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_length_budget(&combined, chunk_size, counter)
}

/// Longest suffix of `text` within `limit` units, preferring to start on a word boundary.
fn tail_with_length_limit<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    if limit == 0 {
        return "";
    }

    let trimmed_text = text.trim_start();
    if counter.as_ref()(trimmed_text) <= limit {
        return trimmed_text;
    }

    for (start, _) in text.char_indices().skip(1) {
        let candidate = text[start..].trim_start();
        if counter.as_ref()(candidate) <= limit {
            return align_to_word_start(text, start, candidate);
        }
    }

    ""
}

/// Drop a leading word fragment when the cut at `start` landed mid-word.
fn align_to_word_start<'a>(text: &'a str, start: usize, candidate: &'a str) -> &'a str {
    let cut_mid_word = text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace())
        && !starts_with_whitespace(&text[start..]);
    if !cut_mid_word {
        return candidate;
    }
    match candidate.find(char::is_whitespace) {
        Some(offset) => {
            let aligned = candidate[offset..].trim_start();
            if aligned.is_empty() { candidate } else { aligned }
        }
        None => candidate,
    }
}

/// Drop leading units until `text` fits `budget`, never starting inside a word.
fn trim_to_length_budget(text: &str, budget: usize, counter: &LengthCounter) -> String {
    if budget == 0 {
        return String::new();
    }

    if counter.as_ref()(text) <= budget {
        return text.to_string();
    }

    for (start, _) in text.char_indices().skip(1) {
        let candidate = text[start..].trim_start();
        if counter.as_ref()(candidate) <= budget {
            return align_to_word_start(text, start, candidate).to_string();
        }
    }

    String::new()
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}
