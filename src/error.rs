//! Infrastructure failures.
//!
//! Business outcomes (a failed gate, a duplicate upload) are data and live
//! in [`tome_core::gate`] and the ingest/promote result records. The
//! variants here are the conditions a caller cannot proceed past: broken
//! files, identity collisions on write, missing staging entries and I/O.

use std::path::PathBuf;

use thiserror::Error;
use tome_core::CoreError;

#[derive(Error, Debug)]
pub enum VaultError {
    /// File exists but its required sections cannot be parsed. Bulk scans
    /// skip these and continue.
    #[error("corrupt archive {}: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error("key '{key}' already belongs to document {existing_hash}")]
    DuplicateKey { key: String, existing_hash: String },

    /// The same bytes already sit in the catalog under another identity.
    #[error("document {content_hash} already cataloged as '{existing_key}'")]
    DuplicateContent {
        content_hash: String,
        existing_key: String,
    },

    #[error("DOI '{doi}' already cataloged as '{existing_key}'")]
    DuplicateDoi { doi: String, existing_key: String },

    /// A staging directory whose metadata snapshot cannot be read.
    #[error("corrupt staging entry {}: {reason}", path.display())]
    CorruptEntry { path: PathBuf, reason: String },

    #[error("no staged entry '{0}'")]
    EntryNotFound(String),

    #[error("staged entry '{0}' has no source document")]
    MissingSource(String),

    #[error("unsafe key '{key}': {reason}")]
    UnsafeKey { key: String, reason: String },

    #[error("unsupported schema version {0}")]
    UnsupportedSchema(u32),

    #[error("{0}")]
    Extraction(String),

    #[error(transparent)]
    Core(CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive container error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<CoreError> for VaultError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnsupportedSchema { found, .. } => VaultError::UnsupportedSchema(found),
            CoreError::UnsafeKey { key, reason } => VaultError::UnsafeKey { key, reason },
            other => VaultError::Core(other),
        }
    }
}

impl VaultError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        VaultError::CorruptArchive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, VaultError::CorruptArchive { .. })
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
