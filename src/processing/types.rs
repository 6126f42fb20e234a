//! Core data types and error definitions for the ingest and query pipelines.

use crate::embedding::EmbeddingClientError;
use crate::hashing::Fingerprint;
use crate::index::IndexError;
use crate::llm::LanguageModelError;
use crate::processing::extract::ExtractError;
use anyhow::Error as TokenizerError;
use std::io;
use thiserror::Error;

/// Errors produced while turning page text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Stage failures of the ingest pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Text extraction failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// Splitting failed.
    #[error("Error splitting PDF content: {0}")]
    Chunking(#[from] ChunkingError),
    /// Splitting produced nothing to embed.
    #[error("Error splitting PDF content: no chunks were produced")]
    NoChunks,
    /// Embedding provider failed.
    #[error("Error creating embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Building or persisting the index failed.
    #[error("Error saving vector store: {0}")]
    Index(#[from] IndexError),
    /// Blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Stage failures of the query pipeline.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// Question was empty or whitespace.
    #[error("Question cannot be empty")]
    EmptyQuestion,
    /// Loading or searching the index failed.
    #[error("Error loading vector store: {0}")]
    Index(#[from] IndexError),
    /// Embedding the question failed.
    #[error("Error embedding question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for the question.
    #[error("Embedding provider returned no vector for the question")]
    EmptyEmbedding,
    /// Language model call failed.
    #[error("Error generating answer: {0}")]
    LanguageModel(#[from] LanguageModelError),
}

/// Externally visible failure kinds; the HTTP layer maps each to a status code.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad file type, unsafe file name, missing upload.
    #[error("{0}")]
    InvalidInput(String),
    /// Missing file or index.
    #[error("{0}")]
    NotFound(String),
    /// Filesystem access was refused.
    #[error("{0}")]
    Permission(String),
    /// Saving, extraction, splitting, embedding, or index build failed.
    #[error("{0}")]
    Processing(String),
    /// Retrieval or synthesis failed.
    #[error("{0}")]
    Answering(String),
    /// Required configuration, such as the API credential, is missing.
    #[error("{0}")]
    Configuration(String),
}

impl ServiceError {
    /// Classify an ingest failure raised while handling an upload.
    pub(crate) fn from_ingest(error: &IngestError) -> Self {
        match error {
            IngestError::Extract(ExtractError::NotFound(_)) => {
                Self::NotFound(format!("File not found: {error}"))
            }
            IngestError::Extract(ExtractError::PermissionDenied(_)) => {
                Self::Permission(format!("Permission denied: {error}"))
            }
            IngestError::Index(index) if index.io_kind() == Some(io::ErrorKind::PermissionDenied) => {
                Self::Permission(format!("Permission denied: {error}"))
            }
            IngestError::Embedding(EmbeddingClientError::MissingCredential) => {
                Self::Configuration(format!("Error processing PDF: {error}"))
            }
            _ => Self::Processing(format!("Error processing PDF: {error}")),
        }
    }

    /// Classify a query failure raised while answering a question.
    pub(crate) fn from_answer(error: &AnswerError) -> Self {
        match error {
            AnswerError::Index(IndexError::NotFound(_)) => {
                Self::NotFound("PDF not found. Please upload the file first.".to_string())
            }
            AnswerError::Embedding(EmbeddingClientError::MissingCredential)
            | AnswerError::LanguageModel(LanguageModelError::MissingCredential) => {
                Self::Configuration(format!("Error answering question: {error}"))
            }
            _ => Self::Answering(format!("Error answering question: {error}")),
        }
    }

    /// Classify a filesystem failure hit while fingerprinting a saved upload.
    pub(crate) fn from_io(context: &str, error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(format!("File not found: {context}: {error}")),
            io::ErrorKind::PermissionDenied => {
                Self::Permission(format!("Permission denied: {context}: {error}"))
            }
            _ => Self::Processing(format!("Error processing PDF: {context}: {error}")),
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Content fingerprint of the uploaded bytes.
    pub fingerprint: Fingerprint,
    /// File name the bytes were stored under.
    pub filename: String,
    /// Whether an index already existed, so ingestion was skipped.
    pub cache_hit: bool,
}

/// Result of a successful question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// Answer text.
    pub answer: String,
    /// Fingerprint the question was asked against.
    pub fingerprint: Fingerprint,
}

/// Summary of a completed ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Pages that produced text.
    pub page_count: usize,
    /// Chunks embedded and stored.
    pub chunk_count: usize,
    /// Repeated chunks dropped before embedding.
    pub skipped_duplicates: usize,
    /// Embedding dimension.
    pub dimension: usize,
    /// Whether this build published the index or found one already in place.
    pub published: bool,
}
