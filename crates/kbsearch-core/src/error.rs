use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Fatal at startup: missing corpus root, credentials or invalid knobs.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Failed to ingest {path}: {reason}")]
    Ingestion { path: String, reason: String },

    #[error("Embedding provider failed: {0}")]
    EmbeddingProvider(String),

    #[error("Index I/O failed: {0}")]
    IndexIo(String),

    #[error("Invalid query: {0}")]
    Query(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn ingestion(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Ingestion { path: path.into(), reason: reason.to_string() }
    }

    pub fn index_io(context: &str, err: impl std::fmt::Display) -> Self {
        Self::IndexIo(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
