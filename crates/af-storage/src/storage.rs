//! Storage Abstraction
//!
//! Provides a unified interface for file storage backends.

use af_core::AccessPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// One backend of a dual pair failed; the pair may now be inconsistent.
    #[error("Backends diverged, {backend} failed: {source}")]
    Diverged {
        backend: String,
        #[source]
        source: Box<StorageError>,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Content type (MIME)
    pub content_type: String,
    /// SHA256 digest
    pub digest: String,
}

/// Per-write options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    pub access_policy: AccessPolicy,
}

impl PutOptions {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            access_policy: AccessPolicy::default(),
        }
    }

    pub fn access_policy(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = policy;
        self
    }
}

/// Storage trait - unified interface for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store data at a key, replacing whatever was there
    async fn put(&self, key: &str, data: Bytes, options: &PutOptions) -> StorageResult<FileMetadata>;

    /// Retrieve data by key; `None` when nothing is stored there
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Delete data by key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get storage name for logging
    fn name(&self) -> &str;
}

/// Calculate the hex SHA256 digest of some data
pub fn calculate_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_hex() {
        let digest = calculate_digest(b"hello");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_diverged_message_names_backend() {
        let err = StorageError::Diverged {
            backend: "s3".to_string(),
            source: Box::new(StorageError::BackendError("timeout".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Backends diverged, s3 failed: Storage backend error: timeout"
        );
    }

    #[test]
    fn test_put_options_default_policy() {
        let options = PutOptions::new("image/png");
        assert_eq!(options.access_policy, AccessPolicy::PublicRead);
        let options = options.access_policy(AccessPolicy::Private);
        assert_eq!(options.access_policy.as_str(), "private");
    }
}
