//! Image source error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("access denied to {0:?}")]
    PermissionDenied(PathBuf),

    #[error("image source not found: {0:?}")]
    NotFound(PathBuf),

    #[error("failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Map an I/O failure on `path` to the matching variant
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => SourceError::PermissionDenied(path.into()),
            std::io::ErrorKind::NotFound => SourceError::NotFound(path.into()),
            _ => SourceError::Io(err),
        }
    }
}
