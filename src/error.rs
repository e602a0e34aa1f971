//! Error types shared by the vault and pipeline modules.
//!
//! Every variant carries the offending path (and, for pipeline failures, the
//! stage) in its message so a failed item can be reported and retried without
//! additional context.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors raised by the hierarchy, metadata, index, chunking and queue modules.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Invalid input: a path outside the vault root, a bad chunk configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// A folder or file target does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Structured metadata could not be parsed.
    #[error("malformed metadata in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Reading or writing a document failed.
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Extraction, summarization or share-link collaborator failed.
    #[error("{service} failed: {message}")]
    ExternalService { service: String, message: String },

    /// The index type for a path could not be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Work was abandoned because the run was cancelled.
    #[error("cancelled before {0}")]
    Cancelled(String),
}

impl VaultError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        VaultError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        VaultError::Parse {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        VaultError::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }
}
