use thiserror::Error;

use ptms_shared::PtmsError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Creating the cache directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored preference could not be decoded.
    #[error("Invalid value for preference `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    /// JSON (de)serialization of a stored document failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for PtmsError {
    fn from(err: StoreError) -> Self {
        PtmsError::Cache(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
