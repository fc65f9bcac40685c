//! Error types for Rollcall.

use rollcall_types::KeywordError;
use thiserror::Error;

use crate::SelectorError;

#[derive(Error, Debug)]
pub enum RollcallError {
    #[error("Invalid selector: {0}")]
    InvalidSelector(#[from] SelectorError),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid keywords: {0}")]
    InvalidKeywords(#[from] KeywordError),

    #[error("Stored value under '{key}' is malformed: {message}")]
    MalformedRecord { key: String, message: String },

    #[error("Document source does not accept pushed snapshots")]
    ReadOnlySource,

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
