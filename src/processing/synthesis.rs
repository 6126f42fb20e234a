//! Answer synthesis over retrieved chunks.
//!
//! `Stuff` places every chunk into a single prompt. `Refine` answers from the first chunk and
//! then revisits the draft once per remaining chunk, keeping the previous draft when a
//! refinement step comes back blank.

use crate::config::AnswerStrategy;
use crate::index::ScoredChunk;
use crate::llm::{CompletionRequest, LanguageModel, LanguageModelError, ModelOutput, StructuredResult};

const SYSTEM_PROMPT: &str = "You answer questions about a PDF document using only the \
context provided. If the context does not contain the answer, say that you don't know.";

fn stuff_prompt(question: &str, context: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end.\n\n\
         {context}\n\nQuestion: {question}\nHelpful Answer:"
    )
}

fn initial_prompt(question: &str, context: &str) -> String {
    format!(
        "Context information is below.\n---------------------\n{context}\n\
         ---------------------\nGiven the context information and no prior knowledge, \
         answer the question: {question}\n"
    )
}

fn refine_prompt(question: &str, existing_answer: &str, context: &str) -> String {
    format!(
        "The original question is as follows: {question}\n\
         We have provided an existing answer: {existing_answer}\n\
         We have the opportunity to refine the existing answer (only if needed) with some \
         more context below.\n------------\n{context}\n------------\n\
         Given the new context, refine the original answer to better answer the question. \
         If the context isn't useful, return the original answer."
    )
}

fn request(prompt: String) -> CompletionRequest {
    CompletionRequest {
        system: Some(SYSTEM_PROMPT.to_string()),
        prompt,
    }
}

/// Run the configured strategy and return the final model output.
///
/// With no chunks there is nothing to ground an answer in; the model is not called and an
/// empty structured output is returned so the caller falls back.
pub async fn synthesize(
    model: &dyn LanguageModel,
    strategy: AnswerStrategy,
    question: &str,
    chunks: &[ScoredChunk<'_>],
) -> Result<ModelOutput, LanguageModelError> {
    if chunks.is_empty() {
        return Ok(ModelOutput::Structured(StructuredResult::default()));
    }

    match strategy {
        AnswerStrategy::Stuff => {
            let context = chunks
                .iter()
                .map(|scored| scored.chunk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            model.complete(request(stuff_prompt(question, &context))).await
        }
        AnswerStrategy::Refine => {
            let Some((first, rest)) = chunks.split_first() else {
                return Ok(ModelOutput::Structured(StructuredResult::default()));
            };
            let mut draft = model
                .complete(request(initial_prompt(question, &first.chunk.text)))
                .await?;

            for (step, scored) in rest.iter().enumerate() {
                let Some(existing) = draft.answer_text().map(str::to_string) else {
                    draft = model
                        .complete(request(initial_prompt(question, &scored.chunk.text)))
                        .await?;
                    continue;
                };
                let refined = model
                    .complete(request(refine_prompt(question, &existing, &scored.chunk.text)))
                    .await?;
                if refined.answer_text().is_some() {
                    draft = refined;
                } else {
                    tracing::debug!(step = step + 1, "Refinement returned no text; keeping draft");
                }
            }
            Ok(draft)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexedChunk;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<ModelOutput>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(mut replies: Vec<ModelOutput>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<ModelOutput, LanguageModelError> {
            self.prompts.lock().expect("lock").push(request.prompt);
            self.replies
                .lock()
                .expect("lock")
                .pop()
                .ok_or_else(|| LanguageModelError::GenerationFailed("script exhausted".into()))
        }
    }

    fn chunk(id: usize, text: &str) -> IndexedChunk {
        IndexedChunk {
            id,
            page: 1,
            text: text.into(),
            vector: vec![1.0],
        }
    }

    fn scored(chunks: &[IndexedChunk]) -> Vec<ScoredChunk<'_>> {
        chunks
            .iter()
            .map(|chunk| ScoredChunk { chunk, score: 1.0 })
            .collect()
    }

    #[tokio::test]
    async fn refine_calls_once_per_chunk_and_threads_the_draft() {
        let chunks = [chunk(0, "alpha"), chunk(1, "beta"), chunk(2, "gamma")];
        let model = ScriptedModel::new(vec![
            ModelOutput::Text("draft one".into()),
            ModelOutput::Text("draft two".into()),
            ModelOutput::Text("final".into()),
        ]);

        let output = synthesize(&model, AnswerStrategy::Refine, "q?", &scored(&chunks))
            .await
            .expect("answer");

        assert_eq!(output.answer_text(), Some("final"));
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("alpha"));
        assert!(prompts[1].contains("draft one") && prompts[1].contains("beta"));
        assert!(prompts[2].contains("draft two") && prompts[2].contains("gamma"));
    }

    #[tokio::test]
    async fn blank_refinement_keeps_previous_draft() {
        let chunks = [chunk(0, "alpha"), chunk(1, "beta")];
        let model = ScriptedModel::new(vec![
            ModelOutput::Text("kept".into()),
            ModelOutput::Text("   ".into()),
        ]);

        let output = synthesize(&model, AnswerStrategy::Refine, "q?", &scored(&chunks))
            .await
            .expect("answer");
        assert_eq!(output.answer_text(), Some("kept"));
    }

    #[tokio::test]
    async fn stuff_sends_all_chunks_in_one_prompt() {
        let chunks = [chunk(0, "alpha"), chunk(1, "beta")];
        let model = ScriptedModel::new(vec![ModelOutput::Structured(StructuredResult {
            result: Some("both".into()),
        })]);

        let output = synthesize(&model, AnswerStrategy::Stuff, "q?", &scored(&chunks))
            .await
            .expect("answer");

        assert_eq!(output.answer_text(), Some("both"));
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("alpha") && prompts[0].contains("beta"));
    }

    #[tokio::test]
    async fn no_chunks_skips_the_model() {
        let model = ScriptedModel::new(Vec::new());
        let output = synthesize(&model, AnswerStrategy::Refine, "q?", &[])
            .await
            .expect("answer");
        assert_eq!(output.answer_text(), None);
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        let chunks = [chunk(0, "alpha")];
        let model = ScriptedModel::new(Vec::new());
        let error = synthesize(&model, AnswerStrategy::Stuff, "q?", &scored(&chunks))
            .await
            .unwrap_err();
        assert!(matches!(error, LanguageModelError::GenerationFailed(_)));
    }
}
