//! Embedding matrix storage helpers.
//!
//! Embeddings are produced outside this crate. The vault only stores
//! them: an `[N × D]` row-major `f32` matrix, serialized as little-endian
//! bytes inside the archive's chunk section.

use crate::error::{CoreError, Result};

/// Encode a float vector as little-endian f32 bytes.
///
/// ```rust
/// use tome_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes. Trailing bytes short of a full value
/// are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Row-major `rows × dims` matrix of f32.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: usize,
    dims: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(rows: usize, dims: usize, data: Vec<f32>) -> Result<Self> {
        if rows * dims != data.len() {
            return Err(CoreError::EmbeddingShape(format!(
                "{} values cannot fill {}x{}",
                data.len(),
                rows,
                dims
            )));
        }
        Ok(Self { rows, dims, data })
    }

    /// Build from one vector per chunk. All rows must share a length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dims = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|r| r.len() != dims) {
            return Err(CoreError::EmbeddingShape(format!(
                "row {} has {} dims, expected {}",
                bad,
                rows[bad].len(),
                dims
            )));
        }
        let count = rows.len();
        Self::new(count, dims, rows.into_iter().flatten().collect())
    }

    pub fn from_blob(blob: &[u8], rows: usize, dims: usize) -> Result<Self> {
        if blob.len() != rows * dims * 4 {
            return Err(CoreError::EmbeddingShape(format!(
                "{} bytes for {}x{} f32 matrix",
                blob.len(),
                rows,
                dims
            )));
        }
        Self::new(rows, dims, blob_to_vec(blob))
    }

    pub fn to_blob(&self) -> Vec<u8> {
        vec_to_blob(&self.data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.dims;
        Some(&self.data[start..start + self.dims])
    }
}
