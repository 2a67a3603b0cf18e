//! Local filesystem storage

use std::path::{Component, Path, PathBuf};

use af_core::AccessPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::storage::{calculate_digest, FileMetadata, PutOptions, Storage, StorageError, StorageResult};

/// Local filesystem storage
///
/// Keys are paths. Relative keys are joined to the root; absolute keys are
/// accepted only when they already lie inside it.
pub struct LocalStorage {
    /// Root directory for storage
    root: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create storage with a temp directory
    pub fn temp() -> std::io::Result<Self> {
        let dir = std::env::temp_dir().join("affix-attachments");
        std::fs::create_dir_all(&dir)?;
        Ok(Self::new(dir))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a full path
    pub fn resolve_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        let candidate = Path::new(key);

        // Prevent directory traversal
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        let path = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        if !path.starts_with(&self.root) {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Remove directories left empty by a delete, stopping at the root
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }

    /// Guess content type from filename
    fn guess_content_type(key: &str) -> String {
        mime_guess::from_path(key)
            .first_or_octet_stream()
            .to_string()
    }

    #[cfg(unix)]
    async fn apply_access_policy(path: &Path, policy: AccessPolicy) -> StorageResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let mode = match policy {
            AccessPolicy::Private => 0o600,
            AccessPolicy::PublicRead => 0o644,
        };
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn apply_access_policy(_path: &Path, _policy: AccessPolicy) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    #[instrument(skip(self, data, options), fields(storage = "local"))]
    async fn put(&self, key: &str, data: Bytes, options: &PutOptions) -> StorageResult<FileMetadata> {
        let path = self.resolve_path(key)?;
        self.ensure_parent(&path).await?;

        let digest = calculate_digest(&data);
        let size = data.len() as u64;
        let content_type = if options.content_type.is_empty() {
            Self::guess_content_type(key)
        } else {
            options.content_type.clone()
        };

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        Self::apply_access_policy(&path, options.access_policy).await?;

        debug!(path = ?path, size = size, policy = options.access_policy.as_str(), "File stored");

        Ok(FileMetadata {
            size,
            content_type,
            digest,
        })
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let path = self.resolve_path(key)?;

        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let mut file = fs::File::open(&path).await?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).await?;

        Ok(Some(Bytes::from(buffer)))
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve_path(key)?;

        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            debug!(path = ?path, "File deleted");
            self.prune_empty_parents(&path).await;
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (_dir, storage) = storage();
        let options = PutOptions::new("text/plain");

        let data = Bytes::from("Hello, World!");
        let meta = storage.put("test/file.txt", data.clone(), &options).await.unwrap();

        assert_eq!(meta.size, 13);
        assert_eq!(meta.content_type, "text/plain");

        let retrieved = storage.get("test/file.txt").await.unwrap();
        assert_eq!(retrieved, Some(data));

        assert!(storage.exists("test/file.txt").await.unwrap());

        storage.delete("test/file.txt").await.unwrap();
        assert!(!storage.exists("test/file.txt").await.unwrap());
        assert_eq!(storage.get("test/file.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_absolute_keys_inside_root() {
        let (dir, storage) = storage();
        let key = dir.path().join("public/avatars/1/original/a.png");
        let key = key.to_str().unwrap();

        storage
            .put(key, Bytes::from_static(b"png"), &PutOptions::new("image/png"))
            .await
            .unwrap();
        assert!(std::path::Path::new(key).exists());
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_root() {
        let (_dir, storage) = storage();
        let options = PutOptions::new("text/plain");

        let result = storage.put("../escape.txt", Bytes::from("x"), &options).await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));

        let result = storage.put("/definitely/not/under/root.txt", Bytes::from("x"), &options).await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));

        assert!(matches!(storage.get("").await, Err(StorageError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok_and_prunes_empty_dirs() {
        let (dir, storage) = storage();
        storage.delete("never/written.png").await.unwrap();

        storage
            .put("a/b/c.png", Bytes::from("x"), &PutOptions::new("image/png"))
            .await
            .unwrap();
        storage.delete("a/b/c.png").await.unwrap();

        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_content_type_guessed_when_unset() {
        let (_dir, storage) = storage();
        let meta = storage
            .put("photo.png", Bytes::from("x"), &PutOptions::new(""))
            .await
            .unwrap();
        assert_eq!(meta.content_type, "image/png");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_access_policy_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, storage) = storage();
        let private = PutOptions::new("text/plain").access_policy(AccessPolicy::Private);
        storage.put("secret.txt", Bytes::from("x"), &private).await.unwrap();
        storage
            .put("public.txt", Bytes::from("x"), &PutOptions::new("text/plain"))
            .await
            .unwrap();

        let mode = |name: &str| {
            std::fs::metadata(dir.path().join(name))
                .unwrap()
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode("secret.txt"), 0o600);
        assert_eq!(mode("public.txt"), 0o644);
    }
}
