//! Error types for the importer

use thiserror::Error;

use crate::task::TaskState;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] shelf_core::ShelfError),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid choice: {0}")]
    InvalidChoice(String),

    #[error("Invalid task transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State file error: {0}")]
    State(String),

    #[error("Unsupported file operation: {0}")]
    UnsupportedOperation(String),

    /// An observer asked the import to stop
    #[error("Import aborted: {0}")]
    Aborted(String),
}

impl From<zip::result::ZipError> for ImportError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        Self::State(err.to_string())
    }
}
