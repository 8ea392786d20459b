//! Error types for materialization and index writing.

use std::path::PathBuf;
use thiserror::Error;
use yuho_data::DataError;

/// Result type for output operations.
pub type Result<T> = std::result::Result<T, OutputError>;

/// Errors that can occur while writing the archive.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Upstream failure that must stop the run (authentication).
    #[error(transparent)]
    Data(#[from] DataError),

    /// Filesystem error on a specific path.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being written or read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A ZIP archive could not be read.
    #[error("Archive extraction failed for {path}: {reason}")]
    ArchiveExtraction {
        /// Archive path
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OutputError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error must stop the whole run.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Data(e) if e.is_fatal())
    }
}
