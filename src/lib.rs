#![deny(missing_docs)]

//! Core library for the PDF RAG server.

/// Retrieval-augmented answer generation.
pub mod answer;
/// HTTP routing and REST handlers.
pub mod api;
/// Remote LLM completion clients.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Vector index with local and Qdrant backends.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// PDF text extraction and chunking.
pub mod segmenter;
/// Service wiring the upload and query pipelines together.
pub mod service;
