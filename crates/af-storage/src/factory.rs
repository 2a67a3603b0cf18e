use std::sync::Arc;

use af_core::{StorageBackend, StorageConfig};

use crate::dual::DualStorage;
use crate::local::LocalStorage;
use crate::memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
use crate::s3::S3Storage;
use crate::storage::{Storage, StorageError, StorageResult};

/// Create a storage backend based on configuration
///
/// The dual backend pairs local storage (primary) with S3 (secondary).
pub fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        StorageBackend::Local => Arc::new(LocalStorage::new(&config.local.root)),
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::S3 => create_s3(config)?,
        StorageBackend::Dual => {
            let primary: Arc<dyn Storage> = Arc::new(LocalStorage::new(&config.local.root));
            let secondary = create_s3(config)?;
            Arc::new(
                DualStorage::new(primary, secondary).with_policy(config.dual.failure_policy),
            )
        }
    };

    tracing::debug!(backend = %config.backend, storage = storage.name(), "Storage created");
    Ok(storage)
}

#[cfg(feature = "storage-s3")]
fn create_s3(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    let s3 = config
        .s3
        .as_ref()
        .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
    Ok(Arc::new(S3Storage::new(s3)?))
}

#[cfg(not(feature = "storage-s3"))]
fn create_s3(_config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    Err(StorageError::ConfigError(
        "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
    ))
}
