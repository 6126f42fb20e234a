//! Content fingerprints used as the cache key for derived indexes.
//!
//! A fingerprint is the lowercase hex SHA-256 digest of a file's bytes. Files are read in
//! fixed 4 KiB blocks so hashing memory stays flat regardless of document size.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

const BLOCK_SIZE: usize = 4096;

/// Rejection reasons for externally supplied fingerprints.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    /// Value did not contain exactly 64 characters.
    #[error("fingerprint must be {expected} hex characters, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Observed length.
        actual: usize,
    },
    /// Value contained a non-hex character.
    #[error("fingerprint contains non-hex character {0:?}")]
    InvalidCharacter(char),
}

/// SHA-256 digest of a document's full byte content, rendered as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex rendering.
    pub const LEN: usize = 64;

    /// Validate a client-supplied fingerprint. Uppercase hex is accepted and normalized.
    pub fn parse(value: &str) -> Result<Self, FingerprintError> {
        let actual = value.chars().count();
        if actual != Self::LEN {
            return Err(FingerprintError::InvalidLength {
                expected: Self::LEN,
                actual,
            });
        }
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(FingerprintError::InvalidCharacter(bad));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Borrow the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_hasher(hasher: Sha256) -> Self {
        Self(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint everything readable from `reader`, block by block.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    let mut block = [0_u8; BLOCK_SIZE];
    loop {
        let read = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&block[..read]);
    }
    Ok(Fingerprint::from_hasher(hasher))
}

/// Fingerprint the file at `path`.
pub fn fingerprint_file(path: &Path) -> io::Result<Fingerprint> {
    let file = File::open(path)?;
    fingerprint_reader(file)
}

/// Fingerprint an in-memory buffer.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint::from_hasher(hasher)
}

/// Compute a deterministic SHA-256 hash for chunk text, used to drop repeated chunks.
pub fn compute_chunk_hash(text: &str) -> String {
    fingerprint_bytes(text.as_bytes()).0
}
