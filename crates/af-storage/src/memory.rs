//! In-memory storage for testing

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::storage::{calculate_digest, FileMetadata, PutOptions, Storage, StorageError, StorageResult};

/// A call recorded by [`MemoryStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOperation {
    Put { key: String, content_type: String },
    Get { key: String },
    Delete { key: String },
    Exists { key: String },
}

impl StorageOperation {
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Get { key } | Self::Delete { key } | Self::Exists { key } => key,
        }
    }
}

/// In-memory storage
///
/// Records every call so tests can assert on what reached the backend, and
/// can be told to fail writes or deletes whose key contains a pattern.
pub struct MemoryStorage {
    name: String,
    files: RwLock<HashMap<String, (Bytes, FileMetadata)>>,
    operations: Mutex<Vec<StorageOperation>>,
    failing_puts: Vec<String>,
    failing_deletes: Vec<String>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: RwLock::new(HashMap::new()),
            operations: Mutex::new(Vec::new()),
            failing_puts: Vec::new(),
            failing_deletes: Vec::new(),
        }
    }

    /// Fail every put whose key contains `pattern`
    pub fn with_put_failure(mut self, pattern: impl Into<String>) -> Self {
        self.failing_puts.push(pattern.into());
        self
    }

    /// Fail every delete whose key contains `pattern`
    pub fn with_delete_failure(mut self, pattern: impl Into<String>) -> Self {
        self.failing_deletes.push(pattern.into());
        self
    }

    /// Every call made so far, in order
    pub fn operations(&self) -> Vec<StorageOperation> {
        self.operations
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    pub fn put_count(&self) -> usize {
        self.count(|op| matches!(op, StorageOperation::Put { .. }))
    }

    pub fn delete_count(&self) -> usize {
        self.count(|op| matches!(op, StorageOperation::Delete { .. }))
    }

    pub fn get_count(&self) -> usize {
        self.count(|op| matches!(op, StorageOperation::Get { .. }))
    }

    pub fn clear_operations(&self) {
        if let Ok(mut ops) = self.operations.lock() {
            ops.clear();
        }
    }

    /// Keys currently stored, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn content_type_of(&self, key: &str) -> Option<String> {
        self.files
            .read()
            .await
            .get(key)
            .map(|(_, meta)| meta.content_type.clone())
    }

    fn count(&self, predicate: impl Fn(&StorageOperation) -> bool) -> usize {
        self.operations
            .lock()
            .map(|ops| ops.iter().filter(|op| predicate(op)).count())
            .unwrap_or(0)
    }

    fn record(&self, operation: StorageOperation) {
        if let Ok(mut ops) = self.operations.lock() {
            ops.push(operation);
        }
    }

    fn should_fail(patterns: &[String], key: &str) -> bool {
        patterns.iter().any(|p| key.contains(p.as_str()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: Bytes, options: &PutOptions) -> StorageResult<FileMetadata> {
        self.record(StorageOperation::Put {
            key: key.to_string(),
            content_type: options.content_type.clone(),
        });

        if Self::should_fail(&self.failing_puts, key) {
            return Err(StorageError::BackendError(format!(
                "{}: put failed for {}",
                self.name, key
            )));
        }

        let metadata = FileMetadata {
            size: data.len() as u64,
            content_type: options.content_type.clone(),
            digest: calculate_digest(&data),
        };

        self.files
            .write()
            .await
            .insert(key.to_string(), (data, metadata.clone()));

        Ok(metadata)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.record(StorageOperation::Get { key: key.to_string() });
        Ok(self.files.read().await.get(key).map(|(data, _)| data.clone()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.record(StorageOperation::Delete { key: key.to_string() });

        if Self::should_fail(&self.failing_deletes, key) {
            return Err(StorageError::BackendError(format!(
                "{}: delete failed for {}",
                self.name, key
            )));
        }

        self.files.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.record(StorageOperation::Exists { key: key.to_string() });
        Ok(self.files.read().await.contains_key(key))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();

        let data = Bytes::from("Test data");
        storage
            .put("key1", data.clone(), &PutOptions::new("text/plain"))
            .await
            .unwrap();

        assert_eq!(storage.get("key1").await.unwrap(), Some(data));
        assert!(storage.exists("key1").await.unwrap());

        storage.delete("key1").await.unwrap();
        assert!(!storage.exists("key1").await.unwrap());
        assert_eq!(storage.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_operations_are_journaled() {
        let storage = MemoryStorage::named("remote");
        storage
            .put("a", Bytes::from("1"), &PutOptions::new("image/png"))
            .await
            .unwrap();
        storage.delete("missing").await.unwrap();

        assert_eq!(storage.name(), "remote");
        assert_eq!(storage.put_count(), 1);
        assert_eq!(storage.delete_count(), 1);
        assert_eq!(
            storage.operations()[0],
            StorageOperation::Put {
                key: "a".to_string(),
                content_type: "image/png".to_string()
            }
        );
        assert_eq!(storage.content_type_of("a").await.as_deref(), Some("image/png"));

        storage.clear_operations();
        assert!(storage.operations().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let storage = MemoryStorage::new()
            .with_put_failure("/thumb/")
            .with_delete_failure("locked");

        let options = PutOptions::new("image/png");
        assert!(storage.put("x/original/a.png", Bytes::from("1"), &options).await.is_ok());
        assert!(storage.put("x/thumb/a.png", Bytes::from("1"), &options).await.is_err());
        assert!(storage.delete("locked.png").await.is_err());

        assert_eq!(storage.keys().await, vec!["x/original/a.png".to_string()]);
        assert_eq!(storage.put_count(), 2);
    }
}
