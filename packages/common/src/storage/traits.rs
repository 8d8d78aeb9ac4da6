use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageError;

/// A time-limited read handle for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Key-addressed object storage for finished report artifacts.
///
/// Writing an existing key replaces the object, so retries of the same job
/// overwrite instead of leaving orphans behind.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Retrieve all bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Delete the object under `key`.
    ///
    /// Returns `true` if the object was deleted, `false` if it did not exist.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Produce a download handle valid for `ttl`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError>;
}
