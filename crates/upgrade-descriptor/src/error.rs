//! Error types for descriptor handling.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while parsing versions or reading descriptors.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// Version string is empty or cannot be used as a directory name.
    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    /// Descriptor path is absolute or escapes the package root.
    #[error("unsafe descriptor path '{0}'")]
    UnsafePath(String),

    #[error("descriptor JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> DescriptorError {
    DescriptorError::Io {
        path: path.into(),
        source,
    }
}
