//! Error types for xmlscrub.
//!
//! Library crates use [`ScrubError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::Stage;

/// Top-level error type for all xmlscrub operations.
#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The target directory is missing or cannot be listed.
    #[error("cannot list directory {path:?}: {source}")]
    DirectoryAccess {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem I/O error on a single file.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The document is not well-formed XML.
    #[error("XML parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },

    /// Data validation error (bad prefix list, invalid option, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {message}")]
    Task { message: String },

    /// A stage stopped the batch on its first failing file.
    #[error("{stage} stage stopped at {path:?}: {source}")]
    Aborted {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: Box<ScrubError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScrubError>;

impl ScrubError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error at a byte offset.
    pub fn parse(position: u64, msg: impl Into<String>) -> Self {
        Self::Parse {
            position,
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

    /// Wrap a directory listing failure.
    pub fn directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryAccess {
            path: path.into(),
            source,
        }
    }

    /// Create a worker task error.
    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task {
            message: msg.into(),
        }
    }

    /// Attach the stage and file that stopped a batch.
    pub fn aborted(stage: Stage, path: impl Into<PathBuf>, source: ScrubError) -> Self {
        Self::Aborted {
            stage,
            path: path.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ScrubError::config("jobs must be at least 1");
        assert_eq!(err.to_string(), "config error: jobs must be at least 1");

        let err = ScrubError::parse(42, "unterminated entity");
        assert_eq!(err.to_string(), "XML parse error at byte 42: unterminated entity");
    }

    #[test]
    fn aborted_names_stage_and_file() {
        let inner = ScrubError::parse(7, "mismatched end tag");
        let err = ScrubError::aborted(Stage::Collapse, "out/alspac_91_pq.xml", inner);
        let msg = err.to_string();
        assert!(msg.starts_with("collapse stage stopped at"));
        assert!(msg.contains("alspac_91_pq.xml"));
        assert!(msg.contains("mismatched end tag"));
    }
}
