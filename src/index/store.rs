//! Flat vector index and its on-disk store.
//!
//! Each document gets `<root>/<fingerprint>/` holding `manifest.json` and `chunks.json`.
//! Builds are staged in `<root>/.tmp-<fingerprint>-<uuid>/` and renamed into place once both
//! files are synced, so a directory at the final path is always a complete index.

use crate::hashing::Fingerprint;
use crate::index::types::{
    INDEX_FORMAT_VERSION, IndexError, IndexManifest, IndexedChunk, SaveOutcome, ScoredChunk,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";
const TEMP_PREFIX: &str = ".tmp-";

/// Chunk text waiting to be paired with its embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// 1-based source page.
    pub page: u32,
    /// Chunk text.
    pub text: String,
}

/// In-memory index searched by exhaustive cosine similarity.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Pair chunks with their embeddings and stamp a manifest.
    pub fn build(
        fingerprint: &Fingerprint,
        embedding_model: &str,
        records: Vec<ChunkRecord>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if records.is_empty() {
            return Err(IndexError::InvalidInput("no chunks to index".into()));
        }
        if records.len() != vectors.len() {
            return Err(IndexError::InvalidInput(format!(
                "{} chunks but {} embeddings",
                records.len(),
                vectors.len()
            )));
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or_default();
        if dimension == 0 {
            return Err(IndexError::InvalidInput("embeddings are empty".into()));
        }

        let chunks = records
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(id, (record, vector))| {
                if vector.len() == dimension {
                    Ok(IndexedChunk {
                        id,
                        page: record.page,
                        text: record.text,
                        vector,
                    })
                } else {
                    Err(IndexError::DimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            fingerprint: fingerprint.to_string(),
            embedding_model: embedding_model.to_string(),
            dimension,
            chunk_count: chunks.len(),
            created_at: current_timestamp_rfc3339(),
        };

        Ok(Self { manifest, chunks })
    }

    /// Manifest describing this index.
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    #[cfg(test)]
    pub(crate) fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    /// Return the `k` chunks most similar to `query`, best first. Ties keep document order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk<'_>>, IndexError> {
        if query.len() != self.manifest.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.manifest.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<ScoredChunk<'_>> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                chunk,
                score: cosine_similarity(query, &chunk.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    fn check_consistency(&self, path: &Path) -> Result<(), IndexError> {
        if self.manifest.chunk_count != self.chunks.len() {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "manifest lists {} chunks, found {}",
                    self.manifest.chunk_count,
                    self.chunks.len()
                ),
            });
        }
        if let Some(chunk) = self
            .chunks
            .iter()
            .find(|chunk| chunk.vector.len() != self.manifest.dimension)
        {
            return Err(IndexError::DimensionMismatch {
                expected: self.manifest.dimension,
                actual: chunk.vector.len(),
            });
        }
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Directory of per-fingerprint indexes.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    /// Wrap an index root. Nothing is touched on disk until [`IndexStore::ensure_root`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final directory for a fingerprint.
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }

    /// Create the root and clear temporary build directories left by interrupted builds.
    pub async fn ensure_root(&self) -> Result<usize, IndexError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| IndexError::io(&self.root, source))?;

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|source| IndexError::io(&self.root, source))?;
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| IndexError::io(&self.root, source))?
        {
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                let path = entry.path();
                match tokio::fs::remove_dir_all(&path).await {
                    Ok(()) => removed += 1,
                    Err(error) => {
                        tracing::warn!(path = %path.display(), error = %error, "Failed to remove stale index build");
                    }
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, root = %self.root.display(), "Removed stale index builds");
        }
        Ok(removed)
    }

    /// Whether a published index exists for the fingerprint.
    pub async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, IndexError> {
        let path = self.path_for(fingerprint);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| IndexError::io(path, source))
    }

    /// Persist an index, publishing it with a single directory rename.
    pub async fn save(&self, index: &VectorIndex) -> Result<SaveOutcome, IndexError> {
        let fingerprint = &index.manifest.fingerprint;
        let final_path = self.root.join(fingerprint);
        let staging = self
            .root
            .join(format!("{TEMP_PREFIX}{fingerprint}-{}", Uuid::new_v4()));

        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|source| IndexError::io(&staging, source))?;

        let written = async {
            write_json(&staging.join(MANIFEST_FILE), &index.manifest).await?;
            write_json(&staging.join(CHUNKS_FILE), &index.chunks).await
        }
        .await;
        if let Err(error) = written {
            discard(&staging).await;
            return Err(error);
        }

        match tokio::fs::rename(&staging, &final_path).await {
            Ok(()) => {
                tracing::debug!(path = %final_path.display(), "Index published");
                Ok(SaveOutcome::Written)
            }
            Err(source) => {
                discard(&staging).await;
                if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
                    tracing::info!(
                        path = %final_path.display(),
                        "Index already published by a concurrent build; keeping existing copy"
                    );
                    Ok(SaveOutcome::AlreadyPresent)
                } else {
                    Err(IndexError::io(final_path, source))
                }
            }
        }
    }

    /// Load the index for a fingerprint, checking it was built with `embedding_model`.
    pub async fn load(
        &self,
        fingerprint: &Fingerprint,
        embedding_model: &str,
    ) -> Result<VectorIndex, IndexError> {
        let dir = self.path_for(fingerprint);
        if !tokio::fs::try_exists(&dir)
            .await
            .map_err(|source| IndexError::io(&dir, source))?
        {
            return Err(IndexError::NotFound(dir));
        }

        let manifest: IndexManifest = read_json(&dir.join(MANIFEST_FILE)).await?;
        if manifest.embedding_model != embedding_model {
            return Err(IndexError::ModelMismatch {
                stored: manifest.embedding_model,
                configured: embedding_model.to_string(),
            });
        }
        let chunks: Vec<IndexedChunk> = read_json(&dir.join(CHUNKS_FILE)).await?;

        let index = VectorIndex { manifest, chunks };
        index.check_consistency(&dir)?;
        Ok(index)
    }
}

async fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), IndexError> {
    let bytes = serde_json::to_vec(value).map_err(|error| IndexError::Corrupt {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|source| IndexError::io(path, source))?;
    file.write_all(&bytes)
        .await
        .map_err(|source| IndexError::io(path, source))?;
    file.sync_all()
        .await
        .map_err(|source| IndexError::io(path, source))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            IndexError::NotFound(path.to_path_buf())
        } else {
            IndexError::io(path, source)
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|error| IndexError::Corrupt {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

async fn discard(staging: &Path) {
    if let Err(error) = tokio::fs::remove_dir_all(staging).await {
        tracing::warn!(path = %staging.display(), error = %error, "Failed to remove index staging directory");
    }
}
