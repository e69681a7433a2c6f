use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Document not found: {id}")]
    NotFound { id: String },
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Collection {index_name} exists with {field} = {persisted}, requested {requested}")]
    ConfigMismatch {
        index_name: String,
        field: &'static str,
        persisted: String,
        requested: String,
    },
    #[error("Store unreachable: {0}")]
    Connectivity(String),
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Store handle already closed")]
    Closed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IndexerError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
