//! Object storage backend (MinIO/S3 or any `object_store` implementation).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{check_range, resource_key, Backend};
use crate::error::{Result, StoreError};

/// Configuration for connecting to MinIO/S3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinioConfig {
    /// S3/MinIO endpoint URL (e.g., "http://minio:9000")
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (required for local MinIO)
    pub allow_http: bool,
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "weather-data".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

impl MinioConfig {
    /// Build an S3 client for this configuration.
    pub fn build_store(&self) -> Result<Arc<dyn ObjectStore>> {
        let s3 = AmazonS3Builder::new()
            .with_endpoint(&self.endpoint)
            .with_bucket_name(&self.bucket)
            .with_access_key_id(&self.access_key_id)
            .with_secret_access_key(&self.secret_access_key)
            .with_region(&self.region)
            .with_allow_http(self.allow_http)
            .build()
            .map_err(|e| StoreError::Config(format!("failed to create S3 client: {}", e)))?;
        Ok(Arc::new(s3))
    }
}

fn map_err(path: &Path, err: object_store::Error) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound(path.to_string()),
        other => StoreError::backend(format!("{}: {}", path, other)),
    }
}

/// Backend over one object in an object store.
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    path: Path,
    len: u64,
    key: u64,
}

impl ObjectStoreBackend {
    /// Open an object, reading its size with a HEAD request.
    #[instrument(skip(store))]
    pub async fn open(store: Arc<dyn ObjectStore>, path: &str) -> Result<Self> {
        let location = Path::from(path);
        let meta = store
            .head(&location)
            .await
            .map_err(|e| map_err(&location, e))?;
        debug!(path = %location, size = meta.size, "Opened object");
        Ok(Self {
            store,
            key: resource_key(location.as_ref()),
            path: location,
            len: meta.size as u64,
        })
    }

    /// Open an object in a MinIO/S3 bucket.
    pub async fn open_minio(config: &MinioConfig, path: &str) -> Result<Self> {
        let store = config.build_store()?;
        Self::open(store, path).await
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    #[instrument(skip(self), fields(path = %self.path))]
    async fn read(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.len)?;
        if length == 0 {
            return Ok(Bytes::new());
        }
        let bytes = self
            .store
            .get_range(&self.path, offset as usize..(offset + length) as usize)
            .await
            .map_err(|e| map_err(&self.path, e))?;
        if bytes.len() as u64 != length {
            return Err(StoreError::backend(format!(
                "{}: short read, {} of {} bytes",
                self.path,
                bytes.len(),
                length
            )));
        }
        Ok(bytes)
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn cache_key(&self) -> u64 {
        self.key
    }
}
