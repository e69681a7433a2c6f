use di_core::IndexerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No reachable host: {0}")]
    Unreachable(String),
    #[error("Unsupported host '{0}'")]
    UnsupportedHost(String),
    #[error("Invalid collection name '{0}'")]
    InvalidName(String),
    #[error("Collection {index_name} exists with {field} = {persisted}, requested {requested}")]
    CollectionMismatch {
        index_name: String,
        field: &'static str,
        persisted: String,
        requested: String,
    },
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Collection directory {path} is locked by another process")]
    Locked { path: String },
    #[error("Corrupt collection data in {path}: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Store handle closed")]
    HandleClosed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for IndexerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unreachable(msg) => IndexerError::Connectivity(msg),
            StoreError::UnsupportedHost(host) => IndexerError::Connectivity(format!("unsupported host '{host}'")),
            StoreError::InvalidName(name) => IndexerError::InvalidConfig(format!("invalid index_name '{name}'")),
            StoreError::CollectionMismatch { index_name, field, persisted, requested } => {
                IndexerError::ConfigMismatch { index_name, field, persisted, requested }
            }
            StoreError::DimensionMismatch { expected, got } => IndexerError::DimensionMismatch { expected, got },
            StoreError::InvalidDocument(msg) => IndexerError::InvalidRequest(msg),
            StoreError::HandleClosed => IndexerError::Closed,
            StoreError::Io(e) => IndexerError::Io(e),
            StoreError::Other(e) => IndexerError::Other(e),
            other => IndexerError::Storage(other.to_string()),
        }
    }
}
