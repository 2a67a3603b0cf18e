//! Attachment errors
//!
//! Validation and processing failures are not errors here: they are collected
//! on the attachment and reported through `save`.

use af_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachmentError {
    /// The parent record cannot hold this slot's metadata
    #[error("{model} model missing required attribute '{attribute}'")]
    MissingAccessor { model: String, attribute: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AttachmentError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingAccessor { .. } | Self::Configuration(_))
    }
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;
