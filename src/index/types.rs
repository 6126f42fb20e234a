//! Shared types for the persisted per-document index.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// On-disk layout version written into every manifest.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Errors returned while building, saving, or loading an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No index directory exists for the fingerprint.
    #[error("Vector store not found at {0}")]
    NotFound(PathBuf),
    /// Filesystem access failed.
    #[error("Vector store I/O failed at {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Index files exist but could not be decoded.
    #[error("Vector store at {path} is corrupt: {reason}")]
    Corrupt {
        /// Offending file.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },
    /// Vectors do not share a single dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension recorded in the manifest.
        expected: usize,
        /// Dimension actually observed.
        actual: usize,
    },
    /// Index was built with a different embedding model than the one configured now.
    #[error("Vector store was built with embedding model '{stored}', but '{configured}' is configured")]
    ModelMismatch {
        /// Model recorded in the manifest.
        stored: String,
        /// Model currently configured.
        configured: String,
    },
    /// Chunk and vector counts differ, or there is nothing to index.
    #[error("Cannot build index: {0}")]
    InvalidInput(String),
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// I/O error kind behind this failure, if it came from the filesystem.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// Metadata stored next to the vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Layout version.
    pub format_version: u32,
    /// Fingerprint of the source document.
    pub fingerprint: String,
    /// Embedding model that produced the vectors.
    pub embedding_model: String,
    /// Vector dimension.
    pub dimension: usize,
    /// Number of stored chunks.
    pub chunk_count: usize,
    /// RFC 3339 build timestamp.
    pub created_at: String,
}

/// One stored chunk and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Position of the chunk in document order.
    pub id: usize,
    /// 1-based page the chunk was cut from.
    pub page: u32,
    /// Chunk text.
    pub text: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

/// Chunk paired with its similarity to a query.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    /// Matched chunk.
    pub chunk: &'a IndexedChunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Outcome of persisting an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// This call published the index.
    Written,
    /// A complete index already existed at the target path; the new copy was discarded.
    AlreadyPresent,
}
