//! Error types for gitstate-git

use std::path::PathBuf;

/// Result type for gitstate-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading repository facts
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Not a git repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("Branch '{name}' not found")]
    BranchNotFound { name: String },

    #[error("Invalid commit timestamp {seconds} on '{reference}'")]
    InvalidTimestamp { reference: String, seconds: i64 },
}
