//! Document service coordinating uploads, fingerprinting, ingestion, and question answering.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, OpenAiEmbeddingClient},
    hashing::{Fingerprint, fingerprint_file},
    index::IndexStore,
    llm::{LanguageModel, OpenAiChatClient},
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        chunking::SplitterSettings,
        ingest::IngestPipeline,
        query::QueryPipeline,
        types::{AnswerOutcome, ServiceError, UploadOutcome},
    },
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Message returned when a fingerprint has no persisted index.
const UNKNOWN_DOCUMENT: &str = "PDF not found. Please upload the file first.";
/// Message returned for uploads that are not PDFs.
const INVALID_FILE_TYPE: &str = "Invalid file type. Only PDF files are allowed.";

/// Owns the upload area, the index store, and both pipelines.
///
/// Construct once near process start, call [`DocumentService::initialize`], and share it
/// through an `Arc` with the HTTP surface.
pub struct DocumentService {
    upload_dir: PathBuf,
    index_store: IndexStore,
    ingest: IngestPipeline,
    query: QueryPipeline,
    metrics: Arc<ServiceMetrics>,
}

/// Abstraction over the document service used by the HTTP surface.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Store an uploaded PDF and make sure an index exists for its contents.
    async fn upload_document(
        &self,
        filename: &str,
        contents: &[u8],
    ) -> Result<UploadOutcome, ServiceError>;

    /// Answer a question against a previously uploaded document.
    async fn answer_question(
        &self,
        question: &str,
        file_hash: &str,
    ) -> Result<AnswerOutcome, ServiceError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl DocumentService {
    /// Build a service backed by the OpenAI-compatible embedding and chat adapters.
    pub fn new(config: &Config) -> Result<Self, ServiceError> {
        tracing::info!(
            base_url = %config.openai_base_url,
            embedding_model = %config.embedding_model,
            chat_model = %config.chat_model,
            "Initializing model clients"
        );
        let embedding_client = OpenAiEmbeddingClient::new(config)
            .map_err(|error| ServiceError::Configuration(error.to_string()))?;
        let language_model = OpenAiChatClient::new(config)
            .map_err(|error| ServiceError::Configuration(error.to_string()))?;
        if config.api_key().is_none() {
            tracing::warn!("OPENAI_API_KEY is not set; ingestion and questions will fail until it is");
        }
        Ok(Self::with_clients(
            config,
            Arc::new(embedding_client),
            Arc::new(language_model),
        ))
    }

    /// Build a service around caller-supplied model clients.
    pub fn with_clients(
        config: &Config,
        embedding_client: Arc<dyn EmbeddingClient>,
        language_model: Arc<dyn LanguageModel>,
    ) -> Self {
        let splitter = SplitterSettings {
            chunk_size: config.text_splitter_chunk_size,
            overlap: config.text_splitter_chunk_overlap,
            unit: config.text_splitter_unit,
            model: config.embedding_model.clone(),
        };
        Self {
            upload_dir: config.upload_dir.clone(),
            index_store: IndexStore::new(config.vector_store_dir.clone()),
            ingest: IngestPipeline::new(embedding_client.clone(), splitter),
            query: QueryPipeline::new(
                embedding_client,
                language_model,
                config.search_top_k,
                config.answer_strategy,
            ),
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Create the upload and index directories and clear interrupted index builds.
    pub async fn initialize(&self) -> Result<(), ServiceError> {
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|error| ServiceError::from_io(&self.upload_dir.display().to_string(), &error))?;
        let removed = self
            .index_store
            .ensure_root()
            .await
            .map_err(|error| ServiceError::Processing(error.to_string()))?;
        tracing::info!(
            upload_dir = %self.upload_dir.display(),
            vector_store = %self.index_store.root().display(),
            stale_builds_removed = removed,
            "Storage ready"
        );
        Ok(())
    }

    /// Store `contents` as `<upload_dir>/<filename>`, fingerprint it, and ingest on first sight.
    pub async fn upload_document(
        &self,
        filename: &str,
        contents: &[u8],
    ) -> Result<UploadOutcome, ServiceError> {
        validate_upload_name(filename)?;

        let path = self.upload_dir.join(filename);
        tokio::fs::write(&path, contents).await.map_err(|error| {
            tracing::error!(path = %path.display(), error = %error, "Saving upload failed");
            ServiceError::Processing(format!("Error saving file: {error}"))
        })?;
        tracing::debug!(path = %path.display(), bytes = contents.len(), "Upload saved");

        let fingerprint = self.fingerprint(&path).await?;

        let cache_hit = self
            .index_store
            .exists(&fingerprint)
            .await
            .map_err(|error| ServiceError::Processing(format!("Error processing PDF: {error}")))?;

        if cache_hit {
            self.metrics.record_cache_hit();
            tracing::info!(fingerprint = %fingerprint, filename, "Index already present; skipping ingest");
        } else {
            let outcome = self
                .ingest
                .ingest(&path, &self.index_store, &fingerprint)
                .await
                .map_err(|error| ServiceError::from_ingest(&error))?;
            self.metrics.record_ingest(outcome.chunk_count as u64);
        }

        Ok(UploadOutcome {
            fingerprint,
            filename: filename.to_string(),
            cache_hit,
        })
    }

    /// Answer `question` from the index stored under `file_hash`.
    pub async fn answer_question(
        &self,
        question: &str,
        file_hash: &str,
    ) -> Result<AnswerOutcome, ServiceError> {
        let fingerprint = Fingerprint::parse(file_hash).map_err(|error| {
            tracing::debug!(file_hash, error = %error, "Rejecting malformed fingerprint");
            ServiceError::NotFound(UNKNOWN_DOCUMENT.to_string())
        })?;

        let known = self
            .index_store
            .exists(&fingerprint)
            .await
            .map_err(|error| ServiceError::Answering(format!("Error answering question: {error}")))?;
        if !known {
            tracing::info!(fingerprint = %fingerprint, "Question for unknown document");
            return Err(ServiceError::NotFound(UNKNOWN_DOCUMENT.to_string()));
        }

        let answer = self
            .query
            .answer(question, &self.index_store, &fingerprint)
            .await
            .map_err(|error| ServiceError::from_answer(&error))?;
        self.metrics.record_answer();
        tracing::info!(fingerprint = %fingerprint, answer_chars = answer.len(), "Question answered");

        Ok(AnswerOutcome {
            answer,
            fingerprint,
        })
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint, ServiceError> {
        let target = path.to_path_buf();
        let context = path.display().to_string();
        tokio::task::spawn_blocking(move || fingerprint_file(&target))
            .await
            .map_err(|error| ServiceError::Processing(format!("Error processing PDF: {error}")))?
            .map_err(|error| {
                tracing::error!(path = %context, error = %error, "Fingerprinting failed");
                ServiceError::from_io(&context, &error)
            })
    }
}

/// Accept bare `*.pdf` file names (extension compared case-insensitively).
pub fn validate_upload_name(filename: &str) -> Result<(), ServiceError> {
    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ServiceError::InvalidInput(INVALID_FILE_TYPE.to_string()));
    }
    let unsafe_name = filename.contains(['/', '\\'])
        || filename.chars().any(char::is_control)
        || filename.trim_start_matches('.').is_empty()
        || filename.starts_with("..");
    if unsafe_name {
        return Err(ServiceError::InvalidInput(format!(
            "Invalid file name: {filename:?}"
        )));
    }
    Ok(())
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn upload_document(
        &self,
        filename: &str,
        contents: &[u8],
    ) -> Result<UploadOutcome, ServiceError> {
        DocumentService::upload_document(self, filename, contents).await
    }

    async fn answer_question(
        &self,
        question: &str,
        file_hash: &str,
    ) -> Result<AnswerOutcome, ServiceError> {
        DocumentService::answer_question(self, question, file_hash).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        DocumentService::metrics_snapshot(self)
    }
}
