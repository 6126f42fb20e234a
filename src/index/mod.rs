//! Local, file-backed retrieval index keyed by document fingerprint.

pub mod store;
pub mod types;

pub use store::{ChunkRecord, IndexStore, VectorIndex};
pub use types::{IndexError, IndexManifest, IndexedChunk, SaveOutcome, ScoredChunk};
