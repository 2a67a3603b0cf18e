//! Dual-backend storage
//!
//! Writes and deletes are attempted on both backends, reads go to the primary.
//! Nothing here makes the pair atomic: when one side fails the backends
//! disagree, and the caller only learns about it through the returned error
//! (or, under [`DualFailurePolicy::PrimaryOnly`], the log).

use std::sync::Arc;

use af_core::DualFailurePolicy;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{error, instrument, warn};

use crate::storage::{FileMetadata, PutOptions, Storage, StorageError, StorageResult};

pub struct DualStorage {
    primary: Arc<dyn Storage>,
    secondary: Arc<dyn Storage>,
    policy: DualFailurePolicy,
    name: String,
}

impl DualStorage {
    pub fn new(primary: Arc<dyn Storage>, secondary: Arc<dyn Storage>) -> Self {
        let name = format!("dual({}+{})", primary.name(), secondary.name());
        Self {
            primary,
            secondary,
            policy: DualFailurePolicy::default(),
            name,
        }
    }

    pub fn with_policy(mut self, policy: DualFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> DualFailurePolicy {
        self.policy
    }

    /// Combine the outcomes of one operation on both backends.
    ///
    /// The primary's value is returned on success.
    fn reconcile<T>(
        &self,
        operation: &str,
        key: &str,
        primary: StorageResult<T>,
        secondary: StorageResult<T>,
    ) -> StorageResult<T> {
        match (primary, secondary) {
            (Ok(value), Ok(_)) => Ok(value),
            (Err(e), Ok(_)) => {
                error!(
                    operation,
                    key,
                    backend = self.primary.name(),
                    error = %e,
                    "Primary backend failed, backends diverged"
                );
                Err(StorageError::Diverged {
                    backend: self.primary.name().to_string(),
                    source: Box::new(e),
                })
            }
            (Ok(value), Err(e)) => match self.policy {
                DualFailurePolicy::SurfaceFirst => {
                    error!(
                        operation,
                        key,
                        backend = self.secondary.name(),
                        error = %e,
                        "Secondary backend failed, backends diverged"
                    );
                    Err(StorageError::Diverged {
                        backend: self.secondary.name().to_string(),
                        source: Box::new(e),
                    })
                }
                DualFailurePolicy::PrimaryOnly => {
                    warn!(
                        operation,
                        key,
                        backend = self.secondary.name(),
                        error = %e,
                        "Secondary backend failed, continuing with primary result"
                    );
                    Ok(value)
                }
            },
            (Err(primary_err), Err(secondary_err)) => {
                error!(
                    operation,
                    key,
                    primary_error = %primary_err,
                    secondary_error = %secondary_err,
                    "Both backends failed"
                );
                Err(primary_err)
            }
        }
    }
}

#[async_trait]
impl Storage for DualStorage {
    #[instrument(skip(self, data, options), fields(storage = %self.name))]
    async fn put(&self, key: &str, data: Bytes, options: &PutOptions) -> StorageResult<FileMetadata> {
        let (primary, secondary) = tokio::join!(
            self.primary.put(key, data.clone(), options),
            self.secondary.put(key, data, options)
        );
        self.reconcile("put", key, primary, secondary)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.primary.get(key).await
    }

    #[instrument(skip(self), fields(storage = %self.name))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let (primary, secondary) =
            tokio::join!(self.primary.delete(key), self.secondary.delete(key));
        self.reconcile("delete", key, primary, secondary)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.primary.exists(key).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;

    fn pair(
        secondary: MemoryStorage,
        policy: DualFailurePolicy,
    ) -> (Arc<MemoryStorage>, Arc<MemoryStorage>, DualStorage) {
        let primary = Arc::new(MemoryStorage::named("local"));
        let secondary = Arc::new(secondary);
        let dual = DualStorage::new(primary.clone(), secondary.clone()).with_policy(policy);
        (primary, secondary, dual)
    }

    #[tokio::test]
    async fn test_writes_and_deletes_reach_both() {
        let (primary, secondary, dual) =
            pair(MemoryStorage::named("remote"), DualFailurePolicy::SurfaceFirst);
        let options = PutOptions::new("image/png");

        dual.put("a.png", Bytes::from("1"), &options).await.unwrap();
        dual.delete("a.png").await.unwrap();

        assert_eq!(primary.put_count(), 1);
        assert_eq!(secondary.put_count(), 1);
        assert_eq!(primary.delete_count(), 1);
        assert_eq!(secondary.delete_count(), 1);
        assert_eq!(dual.name(), "dual(local+remote)");
    }

    #[tokio::test]
    async fn test_reads_only_hit_primary() {
        let (primary, secondary, dual) =
            pair(MemoryStorage::named("remote"), DualFailurePolicy::SurfaceFirst);
        dual.put("a.png", Bytes::from("1"), &PutOptions::new("image/png"))
            .await
            .unwrap();

        assert_eq!(dual.get("a.png").await.unwrap(), Some(Bytes::from("1")));
        assert!(dual.exists("a.png").await.unwrap());
        assert_eq!(primary.get_count(), 1);
        assert_eq!(secondary.get_count(), 0);
        assert!(secondary
            .operations()
            .iter()
            .all(|op| !matches!(op, crate::StorageOperation::Exists { .. })));
    }

    #[tokio::test]
    async fn test_secondary_failure_surfaces_as_divergence() {
        let (primary, _secondary, dual) = pair(
            MemoryStorage::named("remote").with_put_failure("a.png"),
            DualFailurePolicy::SurfaceFirst,
        );

        let err = dual
            .put("a.png", Bytes::from("1"), &PutOptions::new("image/png"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Diverged { ref backend, .. } if backend == "remote"));
        // The primary write already happened; nothing rolls it back.
        assert!(primary.exists("a.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_primary_only_policy_logs_secondary_failure() {
        let (_primary, _secondary, dual) = pair(
            MemoryStorage::named("remote").with_delete_failure("a.png"),
            DualFailurePolicy::PrimaryOnly,
        );

        assert!(dual.delete("a.png").await.is_ok());
        assert_eq!(dual.policy(), DualFailurePolicy::PrimaryOnly);
    }

    #[tokio::test]
    async fn test_both_failing_returns_primary_error() {
        let primary = Arc::new(MemoryStorage::named("local").with_put_failure("x"));
        let secondary = Arc::new(MemoryStorage::named("remote").with_put_failure("x"));
        let dual = DualStorage::new(primary, secondary);

        let err = dual
            .put("x", Bytes::from("1"), &PutOptions::new("text/plain"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::BackendError(ref m) if m.starts_with("local")));
    }
}
