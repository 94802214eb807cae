//! Error types for gitstate-core

use std::path::PathBuf;
use std::time::Duration;

/// Result type for gitstate-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gitstate-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// State document exists but is not a valid document
    #[error("State document at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// State document was written by a different format version
    #[error("State document version {found} does not match {expected}")]
    VersionMismatch { found: String, expected: u32 },

    /// No state document has been generated yet
    #[error("No state document at {path}")]
    MissingDocument { path: PathBuf },

    /// Proposed document failed validation at commit time
    #[error("Invalid mutation: {message}")]
    InvalidMutation { message: String },

    /// Cached state disagrees with the live repository
    #[error("State is inconsistent with the repository: {}", items.join("; "))]
    Inconsistent { items: Vec<String> },

    /// Repository queries ran past their budget
    ///
    /// The budget is checked between queries, not enforced as a deadline:
    /// a single query that never returns is not interrupted.
    #[error("Repository query exceeded {limit:?} (ran {elapsed:?})")]
    QueryTimeout { elapsed: Duration, limit: Duration },

    #[error("Transaction '{name}' is already active")]
    TransactionActive { name: String },

    #[error("No active transaction")]
    NoTransaction,

    #[error("Invalid state path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("Value at '{path}' is not {expected}")]
    TypeMismatch { path: String, expected: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem and locking error from gitstate-fs
    #[error(transparent)]
    Fs(#[from] gitstate_fs::Error),

    /// Repository error from gitstate-git
    #[error(transparent)]
    Git(#[from] gitstate_git::Error),

    /// Configuration error from gitstate-config
    #[error(transparent)]
    Config(#[from] gitstate_config::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Lock not acquired within the timeout.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Fs(gitstate_fs::Error::LockUnavailable { .. }))
    }

    pub(crate) fn invalid_path(path: &str, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            message: message.into(),
        }
    }
}
