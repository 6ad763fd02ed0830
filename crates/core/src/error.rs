// crates/core/src/error.rs
//! Error types for transcript access.
//!
//! Only file-level failures surface as errors. A single unparsable record
//! inside a transcript is skipped (logged at debug level) so one bad line
//! never loses the rest of the file.

use std::path::PathBuf;
use thiserror::Error;

/// Errors opening or reading a transcript file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Transcript file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading transcript: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Classify an `io::Error` into the matching variant.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}
