use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tracing::debug;

use super::error::StorageError;
use super::traits::{BlobStore, PresignedUrl};

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (MinIO, LocalStack). `None` uses the AWS endpoint for `region`.
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

/// S3-backed object store.
pub struct S3BlobStore {
    bucket: Box<Bucket>,
}

impl S3BlobStore {
    pub fn new(settings: &S3Settings) -> Result<Self, StorageError> {
        let region = match &settings.endpoint {
            Some(endpoint) => Region::Custom {
                region: settings.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => settings
                .region
                .parse()
                .map_err(|e| StorageError::Backend(format!("invalid region: {e}")))?,
        };

        let credentials = Credentials::new(
            settings.access_key.as_deref(),
            settings.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid credentials: {e}")))?;

        let mut bucket = Bucket::new(&settings.bucket, region, credentials)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if settings.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self { bucket })
    }
}

fn is_not_found(err: &S3Error) -> bool {
    matches!(err, S3Error::HttpFailWithBody(404, _))
}

fn check_status(key: &str, status: u16) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        other => Err(StorageError::Backend(format!(
            "unexpected status {other} for key {key}"
        ))),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object(key, data)
            .await
            .map_err(|e| StorageError::Backend(format!("PutObject failed: {e}")))?;
        check_status(key, response.status_code())?;
        debug!(key, bytes = data.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(|e| {
            if is_not_found(&e) {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Backend(format!("GetObject failed: {e}"))
            }
        })?;
        check_status(key, response.status_code())?;
        Ok(response.bytes().to_vec())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.bucket.head_object(key).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, status)) => check_status(key, status).map(|_| true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::Backend(format!("HeadObject failed: {e}"))),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        if !self.exists(key).await? {
            return Ok(false);
        }
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| StorageError::Backend(format!("DeleteObject failed: {e}")))?;
        check_status(key, response.status_code())?;
        Ok(true)
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        let expiry_secs = u32::try_from(ttl.as_secs())
            .map_err(|_| StorageError::Presign(format!("ttl too large: {ttl:?}")))?;
        let expires_at = Utc::now() + chrono::Duration::seconds(i64::from(expiry_secs));

        let url = self
            .bucket
            .presign_get(key, expiry_secs, None)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        Ok(PresignedUrl { url, expires_at })
    }
}
