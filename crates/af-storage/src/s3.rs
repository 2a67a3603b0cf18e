//! S3-compatible object storage

use af_core::S3Config;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{Attribute, Attributes, ObjectStoreExt, PutPayload, Result as ObjectResult};
use tracing::instrument;

use crate::storage::{calculate_digest, FileMetadata, PutOptions, Storage, StorageError, StorageResult};

/// S3 storage implementation
///
/// The content type travels with each object. The requested access policy is
/// logged but not applied as a canned ACL; bucket policy governs visibility.
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// Credentials not given in `config` are read from the environment.
    pub fn new(config: &S3Config) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(config.region.clone())
            .with_bucket_name(config.bucket.clone());

        if let Some(ref endpoint) = config.endpoint {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key_id.clone())
                .with_secret_access_key(secret.clone());
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            store,
            bucket: config.bucket.clone(),
        })
    }

    /// Object keys never start with a slash
    fn location(key: &str) -> Path {
        Path::from(key.trim_start_matches('/').to_string())
    }
}

#[async_trait]
impl Storage for S3Storage {
    #[instrument(skip(self, data, options), fields(storage = "s3"))]
    async fn put(&self, key: &str, data: Bytes, options: &PutOptions) -> StorageResult<FileMetadata> {
        let location = Self::location(key);
        let size = data.len() as u64;
        let digest = calculate_digest(&data);
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, options.content_type.clone().into());
        let opts = object_store::PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> =
            object_store::ObjectStore::put_opts(&self.store, &location, PutPayload::from(data), opts)
                .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::BackendError(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            access_policy = options.access_policy.as_str(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(FileMetadata {
            size,
            content_type: options.content_type.clone(),
            digest,
        })
    }

    #[instrument(skip(self), fields(storage = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let location = Self::location(key);
        let start = std::time::Instant::now();

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(ObjectStoreError::NotFound { .. }) => return Ok(None),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                return Err(StorageError::BackendError(e.to_string()));
            }
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(Some(bytes))
    }

    #[instrument(skip(self), fields(storage = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Self::location(key);
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::BackendError(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Self::location(key);
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_strips_leading_slash() {
        assert_eq!(
            S3Storage::location("/system/avatars/1/original/a.png").as_ref(),
            "system/avatars/1/original/a.png"
        );
    }

    #[test]
    fn test_new_with_custom_endpoint() {
        let config = S3Config {
            bucket: "attachments".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: Some("minio".to_string()),
            secret_access_key: Some("minio123".to_string()),
        };
        let storage = S3Storage::new(&config).unwrap();
        assert_eq!(storage.name(), "s3");
        assert_eq!(storage.bucket, "attachments");
    }
}
