//! Ingest pipeline: extract, split, embed, persist.

use crate::embedding::EmbeddingClient;
use crate::hashing::Fingerprint;
use crate::index::{IndexStore, SaveOutcome, VectorIndex};
use crate::processing::{
    chunking::{SplitterSettings, chunk_pages},
    extract::extract_pages,
    types::{IngestError, IngestOutcome},
};
use std::path::Path;
use std::sync::Arc;

/// Turns a stored PDF into a persisted index. Every stage aborts the run on failure.
#[derive(Clone)]
pub struct IngestPipeline {
    embedding_client: Arc<dyn EmbeddingClient>,
    splitter: SplitterSettings,
}

impl IngestPipeline {
    /// Build a pipeline around an embedding client and splitter settings.
    pub fn new(embedding_client: Arc<dyn EmbeddingClient>, splitter: SplitterSettings) -> Self {
        Self {
            embedding_client,
            splitter,
        }
    }

    /// Ingest `pdf_path` and persist its index under `fingerprint`.
    pub async fn ingest(
        &self,
        pdf_path: &Path,
        store: &IndexStore,
        fingerprint: &Fingerprint,
    ) -> Result<IngestOutcome, IngestError> {
        let path = pdf_path.to_path_buf();
        let splitter = self.splitter.clone();
        let (page_count, document) = tokio::task::spawn_blocking(move || {
            let pages = extract_pages(&path)?;
            let document = chunk_pages(&pages, &splitter)?;
            Ok::<_, IngestError>((pages.len(), document))
        })
        .await
        .map_err(|error| IngestError::Task(error.to_string()))?
        .inspect_err(|error| {
            tracing::error!(
                path = %pdf_path.display(),
                fingerprint = %fingerprint,
                error = %error,
                "Extracting or splitting PDF failed"
            );
        })?;
        if document.records.is_empty() {
            tracing::error!(fingerprint = %fingerprint, "Splitting produced no chunks");
            return Err(IngestError::NoChunks);
        }
        tracing::debug!(
            fingerprint = %fingerprint,
            pages = page_count,
            chunks = document.records.len(),
            chunk_size = self.splitter.chunk_size,
            overlap = self.splitter.overlap,
            unit = ?self.splitter.unit,
            skipped_duplicates = document.skipped_duplicates,
            "Extracted and split PDF text"
        );

        let texts: Vec<String> = document
            .records
            .iter()
            .map(|record| record.text.clone())
            .collect();
        let vectors = self
            .embedding_client
            .generate_embeddings(texts)
            .await
            .inspect_err(|error| {
                tracing::error!(fingerprint = %fingerprint, error = %error, "Embedding failed");
            })?;

        let chunk_count = document.records.len();
        let index = VectorIndex::build(
            fingerprint,
            self.embedding_client.model(),
            document.records,
            vectors,
        )?;
        let dimension = index.manifest().dimension;
        let saved = store.save(&index).await.inspect_err(|error| {
            tracing::error!(fingerprint = %fingerprint, error = %error, "Saving index failed");
        })?;

        let outcome = IngestOutcome {
            page_count,
            chunk_count,
            skipped_duplicates: document.skipped_duplicates,
            dimension,
            published: saved == SaveOutcome::Written,
        };
        tracing::info!(
            fingerprint = %fingerprint,
            pages = outcome.page_count,
            chunks = outcome.chunk_count,
            dimension,
            published = outcome.published,
            "Document indexed"
        );
        Ok(outcome)
    }
}
