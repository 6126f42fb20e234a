//! Overlapping fixed-budget chunking of extracted page text.
//!
//! - Boundaries come from `semchunk-rs`, which splits on the most meaningful separator that
//!   keeps each piece within budget (paragraphs, then lines, sentences, words).
//! - Length is measured in characters by default (`TEXT_SPLITTER_UNIT=chars`) or in tokens of
//!   the embedding model's tokenizer (`tokens`), via `tiktoken-rs`.
//! - A sliding overlap copies the tail of each chunk into the head of the next so that spans
//!   around boundaries remain visible to retrieval. The overlapped chunk still respects the
//!   budget.
//! - Pages are chunked independently so every chunk keeps its page number.

use crate::config::ChunkUnit;
use crate::hashing::compute_chunk_hash;
use crate::index::ChunkRecord;
use crate::processing::extract::PageText;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::collections::HashSet;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::ChunkingError;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Splitter parameters derived from configuration.
#[derive(Debug, Clone)]
pub struct SplitterSettings {
    /// Maximum chunk length.
    pub chunk_size: usize,
    /// Overlap carried between adjacent chunks.
    pub overlap: usize,
    /// Unit for both values above.
    pub unit: ChunkUnit,
    /// Embedding model, used to pick a tokenizer in token mode.
    pub model: String,
}

/// Chunks ready for embedding plus dedupe bookkeeping.
#[derive(Debug, Clone)]
pub struct ChunkedDocument {
    /// Unique chunks in document order.
    pub records: Vec<ChunkRecord>,
    /// Chunks dropped because identical text already appeared earlier in the document.
    pub skipped_duplicates: usize,
}

/// Chunk every page and drop repeated chunks (running headers, footers, boilerplate).
pub fn chunk_pages(
    pages: &[PageText],
    settings: &SplitterSettings,
) -> Result<ChunkedDocument, ChunkingError> {
    if settings.chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    let counter = build_length_counter(settings.unit, &settings.model)?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut skipped_duplicates = 0;

    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }
        let chunks =
            chunk_text_with_counter(&page.text, settings.chunk_size, settings.overlap, &counter);
        for text in chunks {
            if text.trim().is_empty() {
                continue;
            }
            if seen.insert(compute_chunk_hash(&text)) {
                records.push(ChunkRecord {
                    page: page.page,
                    text,
                });
            } else {
                skipped_duplicates += 1;
            }
        }
    }

    Ok(ChunkedDocument {
        records,
        skipped_duplicates,
    })
}

/// Build a length counter for the configured unit.
pub(crate) fn build_length_counter(
    unit: ChunkUnit,
    model: &str,
) -> Result<LengthCounter, ChunkingError> {
    match unit {
        ChunkUnit::Characters => Ok(char_counter()),
        ChunkUnit::Tokens => build_tiktoken_counter(model),
    }
}

fn char_counter() -> LengthCounter {
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
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for token counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

/// Split `text` into chunks of at most `chunk_size` units with the requested overlap.
///
/// Boundaries are found with a budget of `chunk_size - overlap` so the carried tail and the
/// fresh text fit together in one chunk.
fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    let base_budget = chunk_size.saturating_sub(effective_overlap).max(1);
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        base_budget,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = enforce_budget(chunker.chunk(text), base_budget, counter);
    apply_overlap(base_chunks, chunk_size, effective_overlap, counter)
}

/// Re-split any chunk that measures over `budget`, first on whitespace, then per character.
fn enforce_budget(chunks: Vec<String>, budget: usize, counter: &LengthCounter) -> Vec<String> {
    let fits = |segment: &str| counter.as_ref()(segment) <= budget;
    let mut bounded = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        if fits(chunk.as_str()) {
            bounded.push(chunk);
            continue;
        }
        let mut current = String::new();
        for word in chunk.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if fits(candidate.as_str()) {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                bounded.push(std::mem::take(&mut current));
            }
            if fits(word) {
                current = word.to_string();
                continue;
            }
            for ch in word.chars() {
                current.push(ch);
                if !fits(current.as_str()) && current.chars().count() > 1 {
                    current.pop();
                    bounded.push(std::mem::take(&mut current));
                    current.push(ch);
                }
            }
        }
        if !current.is_empty() {
            bounded.push(current);
        }
    }

    bounded
}

/// Prefix each chunk after the first with the tail of its predecessor, within budget.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if effective_overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut iter = chunks.into_iter();
    let Some(mut previous) = iter.next() else {
        return overlapped;
    };
    overlapped.push(previous.clone());

    for current in iter {
        let tail = tail_within_limit(&previous, effective_overlap, counter);
        let mut combined = String::with_capacity(tail.len() + current.len() + 1);
        if !tail.is_empty() {
            combined.push_str(tail);
            if !ends_with_whitespace(tail) && !starts_with_whitespace(&current) {
                combined.push(' ');
            }
        }
        combined.push_str(&current);
        overlapped.push(suffix_within_limit(&combined, chunk_size, counter).to_string());
        previous = current;
    }

    overlapped
}

/// Longest whitespace-trimmed suffix of `text` measuring at most `limit`.
fn tail_within_limit<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    if limit == 0 {
        return "";
    }
    suffix_within_limit(text, limit, counter)
}

fn suffix_within_limit<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    let trimmed = text.trim_start();
    if counter.as_ref()(trimmed) <= limit {
        return trimmed;
    }

    for (start, _) in text.char_indices().skip(1) {
        let candidate = text[start..].trim_start();
        if counter.as_ref()(candidate) <= limit {
            return candidate;
        }
    }

    ""
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(chunk_size: usize, overlap: usize) -> SplitterSettings {
        SplitterSettings {
            chunk_size,
            overlap,
            unit: ChunkUnit::Characters,
            model: "text-embedding-ada-002".into(),
        }
    }

    fn page(page: u32, text: &str) -> PageText {
        PageText {
            page,
            text: text.into(),
        }
    }

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn chunks_respect_character_budget_and_keep_words() {
        let text = "Ownership is a set of rules that govern how a Rust program manages memory. \
                    Every value has an owner. There can only be one owner at a time.";
        let counter = char_counter();
        let chunks = chunk_text_with_counter(text, 40, 0, &counter);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "chunk too long: {chunk:?}");
        }
        let rejoined: Vec<String> = chunks.iter().flat_map(|chunk| words(chunk)).collect();
        assert_eq!(rejoined, words(text));
    }

    #[test]
    fn overlap_carries_tail_of_previous_chunk() {
        let chunks = apply_overlap(
            vec!["alpha beta gamma".into(), "delta epsilon".into()],
            30,
            10,
            &char_counter(),
        );
        assert_eq!(chunks[0], "alpha beta gamma");
        assert!(chunks[1].starts_with("beta gamma"));
        assert!(chunks[1].ends_with("delta epsilon"));
        assert!(chunks[1].chars().count() <= 30);
    }

    #[test]
    fn adjacent_chunks_share_the_configured_overlap() {
        let text: Vec<String> = (0..900).map(|i| format!("word{i:04}")).collect();
        let text = text.join(" ");
        let chunks = chunk_text_with_counter(&text, 1000, 200, &char_counter());

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000, "chunk too long: {}", chunk.len());
        }
        for pair in chunks.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            let shared = (1..=previous.len().min(next.len()))
                .rev()
                .find(|&len| next.starts_with(&previous[previous.len() - len..]))
                .unwrap_or(0);
            assert!(shared >= 150, "only {shared} characters carried over");
            assert!(shared <= 200, "{shared} characters carried over");
        }
        let all_words: Vec<String> = chunks.iter().flat_map(|chunk| words(chunk)).collect();
        assert_eq!(all_words.last().map(String::as_str), Some("word0899"));
    }

    #[test]
    fn oversized_pieces_are_split_to_budget() {
        let counter = char_counter();
        let bounded = enforce_budget(
            vec!["short".into(), "aaaa bbbb cccccccccc".into()],
            6,
            &counter,
        );
        assert_eq!(bounded, vec!["short", "aaaa", "bbbb", "cccccc", "cccc"]);
    }

    #[test]
    fn overlapped_chunk_is_trimmed_to_budget() {
        let chunks = apply_overlap(
            vec!["one two three".into(), "four five six".into()],
            15,
            8,
            &char_counter(),
        );
        assert!(chunks[1].chars().count() <= 15);
        assert!(chunks[1].ends_with("four five six"));
    }

    #[test]
    fn pages_keep_their_numbers_and_duplicates_are_dropped() {
        let pages = vec![
            page(1, "Confidential draft"),
            page(2, "Lifetimes prevent dangling references."),
            page(3, "Confidential draft"),
        ];
        let document = chunk_pages(&pages, &settings(100, 20)).expect("chunks");

        assert_eq!(document.records.len(), 2);
        assert_eq!(document.records[0].page, 1);
        assert_eq!(document.records[1].page, 2);
        assert_eq!(document.skipped_duplicates, 1);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let error = chunk_pages(&[page(1, "text")], &settings(0, 0)).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn token_mode_uses_tiktoken_budget() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let token_settings = SplitterSettings {
            unit: ChunkUnit::Tokens,
            ..settings(5, 0)
        };
        let document = chunk_pages(&[page(1, text)], &token_settings).expect("chunks");
        let counter = build_tiktoken_counter("text-embedding-ada-002").expect("counter");
        for record in &document.records {
            assert!(counter.as_ref()(&record.text) <= 5);
        }
        let rejoined: Vec<String> = document
            .records
            .iter()
            .flat_map(|record| words(&record.text))
            .collect();
        assert_eq!(rejoined, words(text));
    }
}
