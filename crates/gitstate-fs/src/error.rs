//! Error types for gitstate-fs

use std::path::PathBuf;
use std::time::Duration;

/// Result type for gitstate-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gitstate-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process kept the lock for the whole wait window
    #[error("Lock at {path} not acquired within {waited:?} (held by {owner})")]
    LockUnavailable {
        path: PathBuf,
        waited: Duration,
        owner: String,
    },

    /// A mutation was attempted without holding the lock
    #[error("Lock at {path} is not held by this process")]
    LockNotHeld { path: PathBuf },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
