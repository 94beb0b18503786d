use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unsupported schema version {found} (this build reads up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("unsafe key '{key}': {reason}")]
    UnsafeKey { key: String, reason: String },

    #[error("exhausted key suffixes a-z for '{0}'")]
    KeysExhausted(String),

    #[error("embedding matrix shape mismatch: {0}")]
    EmbeddingShape(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
