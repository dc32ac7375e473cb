//! Error types for the imgclass-core crate.
//!
//! Every error is fatal to a run: nothing in this crate retries or recovers
//! locally. The binary prints the diagnostic and exits non-zero.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level error type for dataset, acquisition and training operations.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// A directory or file is missing or unreadable.
    #[error("Filesystem error at {path}: {message}")]
    Filesystem { path: PathBuf, message: String },

    /// Downloading or extracting the dataset archive failed.
    #[error("Data acquisition error: {0}")]
    DataAcquisition(String),

    /// A record has no derivable label.
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image error at {path}: {message}")]
    Image { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl ClassifyError {
    pub fn filesystem(path: impl AsRef<Path>, msg: impl Into<String>) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            message: msg.into(),
        }
    }

    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::DataAcquisition(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn image(path: impl AsRef<Path>, msg: impl Into<String>) -> Self {
        Self::Image {
            path: path.as_ref().to_path_buf(),
            message: msg.into(),
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ClassifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_error_names_path() {
        let err = ClassifyError::filesystem("/no/such/dir", "not found");
        assert_eq!(
            err.to_string(),
            "Filesystem error at /no/such/dir: not found"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ClassifyError = io.into();
        assert!(matches!(err, ClassifyError::Io(_)));
    }
}
