//! Error types for gitstate-config

use std::path::PathBuf;

/// Result type for gitstate-config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or compiling configuration
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file not found at expected path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to parse configuration at {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for '{key}': '{value}' (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("Reference to unknown key '${{{reference}}}' in '{key}'")]
    UnresolvedReference { key: String, reference: String },

    #[error("Cyclic reference while resolving '{key}': {chain}")]
    CyclicReference { key: String, chain: String },

    #[error("Invalid branch pattern for type '{branch_type}': {message}")]
    InvalidPattern {
        branch_type: String,
        message: String,
    },

    #[error(transparent)]
    Fs(#[from] gitstate_fs::Error),
}

impl Error {
    pub fn invalid(key: &str, value: &str, expected: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }
}
