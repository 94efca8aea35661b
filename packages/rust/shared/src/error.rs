//! Error types for TenderWatch.
//!
//! Library crates use [`TenderWatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only conditions that end a run early are errors. Per-record outcomes
//! (filter exclusions, documents without records, entries that could not be
//! enriched) are plain values counted by the component that produced them.

use std::path::PathBuf;

/// Top-level error type for all TenderWatch operations.
#[derive(Debug, thiserror::Error)]
pub enum TenderWatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while retrieving the feed archive.
    #[error("network error: {0}")]
    Network(String),

    /// The archive could not be decompressed or holds no feed documents.
    #[error("archive error: {message}")]
    Archive { message: String },

    /// History, usage or results store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad argument, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Relevant entries existed but none of them could be enriched.
    #[error("none of the {relevant} relevant entries could be enriched; check the API key and quota")]
    NothingEnriched { relevant: usize },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TenderWatchError>;

impl TenderWatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an archive error from any displayable message.
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
