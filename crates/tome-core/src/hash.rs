//! Content hashing.
//!
//! A [`ContentHash`] is the SHA-256 digest of a document's raw bytes,
//! rendered as 64 lowercase hex characters. It is the only identity a
//! physical document instance has: byte-identical files always hash the
//! same, and two scans of the same work never do.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Read size used when hashing from a reader.
const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 identity of a document's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash an in-memory byte slice.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        ContentHash(hex::encode(hasher.finalize()))
    }

    /// Hash everything a reader yields, in 64 KiB reads.
    pub fn of_reader<R: std::io::Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(ContentHash(hex::encode(hasher.finalize())))
    }

    /// Wrap an existing hex digest (e.g. read back from the catalog).
    pub fn from_hex(hex_digest: impl Into<String>) -> Self {
        ContentHash(hex_digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` hex characters, used for fallback staging names.
    pub fn short(&self, n: usize) -> &str {
        &self.0[..n.min(self.0.len())]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
