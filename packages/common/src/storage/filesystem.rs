use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::error::StorageError;
use super::traits::{BlobStore, PresignedUrl};

/// Filesystem-backed object store for local runs.
///
/// Objects live at `{base_path}/{key}`; keys use `/` as the separator.
/// Writes go through `{base_path}/.tmp` and are renamed into place.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Map a key onto a path below `base_path`, refusing anything that could escape it.
    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.starts_with('/') || key.contains('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let mut path = self.base_path.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment == ".tmp" {
                return Err(StorageError::InvalidKey(key.to_string()));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Write `data` next to the store and move it over `target` in one rename.
    async fn write_atomically(&self, target: &Path, data: &[u8]) -> std::io::Result<()> {
        let staging = self.base_path.join(".tmp").join(Uuid::new_v4().to_string());
        let result = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir).await?;
            }
            fs::rename(&staging, target).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&staging).await;
        }
        result
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let size = data.len() as u64;
        if size > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: size,
                limit: self.max_size,
            });
        }

        let target = self.object_path(key)?;
        self.write_atomically(&target, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let object_path = self.object_path(key)?;
        match fs::read(&object_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let object_path = self.object_path(key)?;
        Ok(fs::try_exists(&object_path).await?)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let object_path = self.object_path(key)?;
        match fs::remove_file(&object_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        let object_path = self.object_path(key)?;
        let absolute = match fs::canonicalize(&object_path).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Presign(format!("invalid ttl: {e}")))?;
        let expires_at = Utc::now() + ttl;

        Ok(PresignedUrl {
            url: format!(
                "file://{}?expires={}",
                absolute.display(),
                expires_at.timestamp()
            ),
            expires_at,
        })
    }
}
