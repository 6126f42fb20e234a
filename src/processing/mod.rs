//! Document processing: extraction, chunking, ingestion, retrieval, and answer synthesis.

pub mod chunking;
pub mod extract;
pub mod ingest;
pub mod query;
mod service;
pub mod synthesis;
pub mod types;

pub use ingest::IngestPipeline;
pub use query::{NO_ANSWER_FALLBACK, QueryPipeline};
pub use service::{DocumentApi, DocumentService, validate_upload_name};
pub use types::{
    AnswerError, AnswerOutcome, ChunkingError, IngestError, IngestOutcome, ServiceError,
    UploadOutcome,
};
