//! Query pipeline: load the index, retrieve, synthesize, normalize.

use crate::config::AnswerStrategy;
use crate::embedding::EmbeddingClient;
use crate::hashing::Fingerprint;
use crate::index::IndexStore;
use crate::llm::{LanguageModel, ModelOutput};
use crate::processing::{synthesis::synthesize, types::AnswerError};
use std::sync::Arc;

/// Answer returned when the model output carries no text.
pub const NO_ANSWER_FALLBACK: &str = "I couldn't find an answer to that question in the document.";

/// Answers questions against persisted indexes.
#[derive(Clone)]
pub struct QueryPipeline {
    embedding_client: Arc<dyn EmbeddingClient>,
    language_model: Arc<dyn LanguageModel>,
    top_k: usize,
    strategy: AnswerStrategy,
}

impl QueryPipeline {
    /// Build a pipeline retrieving `top_k` chunks per question.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        language_model: Arc<dyn LanguageModel>,
        top_k: usize,
        strategy: AnswerStrategy,
    ) -> Self {
        Self {
            embedding_client,
            language_model,
            top_k,
            strategy,
        }
    }

    /// Answer `question` from the index stored under `fingerprint`.
    pub async fn answer(
        &self,
        question: &str,
        store: &IndexStore,
        fingerprint: &Fingerprint,
    ) -> Result<String, AnswerError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AnswerError::EmptyQuestion);
        }

        let index = store
            .load(fingerprint, self.embedding_client.model())
            .await
            .inspect_err(|error| {
                tracing::error!(fingerprint = %fingerprint, error = %error, "Loading index failed");
            })?;

        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await
            .inspect_err(|error| {
                tracing::error!(fingerprint = %fingerprint, error = %error, "Embedding question failed");
            })?;
        let vector = vectors.pop().ok_or(AnswerError::EmptyEmbedding)?;

        let hits = index.search(&vector, self.top_k)?;
        tracing::debug!(
            fingerprint = %fingerprint,
            hits = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "Retrieved context"
        );

        let output = synthesize(self.language_model.as_ref(), self.strategy, question, &hits)
            .await
            .inspect_err(|error| {
                tracing::error!(
                    fingerprint = %fingerprint,
                    model = self.language_model.model(),
                    error = %error,
                    "Answer synthesis failed"
                );
            })?;

        Ok(normalize_answer(&output))
    }
}

/// Extract answer text from a model output, falling back when there is none.
pub fn normalize_answer(output: &ModelOutput) -> String {
    output
        .answer_text()
        .map_or_else(|| NO_ANSWER_FALLBACK.to_string(), str::to_string)
}
