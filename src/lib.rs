#![deny(missing_docs)]

//! Core library for the PDF question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Content fingerprints for uploaded documents.
pub mod hashing;
/// Per-document vector indexes on local disk.
pub mod index;
/// Chat-completion adapter used for answer synthesis.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query metrics helpers.
pub mod metrics;
/// Document processing pipeline utilities.
pub mod processing;
