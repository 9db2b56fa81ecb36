//! Object storage for compressed images
//! Uses Apache Arrow object_store crate

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload,
    path::Path as StoragePath,
};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageConfig, StorageProvider};
use crate::pipeline::{Store, StoreError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid storage configuration: {0}")]
    Config(String),

    #[error("Failed to prepare local storage root: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether retrying the same request can never succeed
    pub fn is_permanent(&self) -> bool {
        match self {
            StorageError::ObjectStore(err) => matches!(
                err,
                object_store::Error::NotFound { .. }
                    | object_store::Error::PermissionDenied { .. }
                    | object_store::Error::Unauthenticated { .. }
                    | object_store::Error::InvalidPath { .. }
                    | object_store::Error::NotSupported { .. }
                    | object_store::Error::NotImplemented
                    | object_store::Error::UnknownConfigurationKey { .. }
            ),
            StorageError::Config(_) => true,
            StorageError::Io(_) => false,
        }
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
    key_prefix: String,
    public_base_url: String,
    /// Local filesystem stores reject object attributes
    content_type: bool,
}

impl StorageClient {
    /// Create a client over any object_store backend
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        key_prefix: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            content_type: true,
        }
    }

    /// In-memory storage for tests and local runs
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemory::new()),
            "imagepress-local",
            "products",
            "memory://imagepress-local",
        )
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut client = match config.provider {
            StorageProvider::S3 => {
                let mut builder = AmazonS3Builder::new().with_bucket_name(&config.bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint).with_allow_http(true);
                }
                if let (Some(key), Some(secret)) = (&config.access_key, &config.secret_key) {
                    builder = builder
                        .with_access_key_id(key)
                        .with_secret_access_key(secret);
                }
                let base = match (&config.endpoint, &config.region) {
                    (Some(endpoint), _) => {
                        format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket)
                    }
                    (None, Some(region)) => {
                        format!("https://{}.s3.{}.amazonaws.com", config.bucket, region)
                    }
                    (None, None) => {
                        return Err(StorageError::Config(
                            "s3 provider needs a region or an endpoint".to_string(),
                        ));
                    }
                };
                Self::new(Arc::new(builder.build()?), &config.bucket, &config.key_prefix, base)
            }
            StorageProvider::Local => {
                std::fs::create_dir_all(&config.local_root)?;
                let root = std::fs::canonicalize(&config.local_root)?;
                let store = LocalFileSystem::new_with_prefix(&root)?;
                let mut client = Self::new(
                    Arc::new(store),
                    &config.bucket,
                    &config.key_prefix,
                    format!("file://{}", root.display()),
                );
                client.content_type = false;
                client
            }
            StorageProvider::Memory => Self::new(
                Arc::new(InMemory::new()),
                &config.bucket,
                &config.key_prefix,
                format!("memory://{}", config.bucket),
            ),
        };

        if let Some(base) = &config.public_base_url {
            client.public_base_url = base.trim_end_matches('/').to_string();
        }

        Ok(client)
    }

    fn path(&self, key: &str) -> StoragePath {
        if self.key_prefix.is_empty() {
            StoragePath::from(key)
        } else {
            StoragePath::from(format!("{}/{}", self.key_prefix, key))
        }
    }

    /// Public address of an object key
    pub fn address(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, self.path(key))
    }

    /// Upload a JPEG, replacing any object under the same key
    pub async fn upload(&self, key: &str, data: Bytes) -> Result<String> {
        let path = self.path(key);
        let size = data.len();

        let mut opts = PutOptions::default();
        if self.content_type {
            let mut attributes = Attributes::new();
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(mime::IMAGE_JPEG.essence_str().to_string()),
            );
            opts.attributes = attributes;
        }

        self.store
            .put_opts(&path, PutPayload::from(data), opts)
            .await?;

        tracing::debug!(key = %path, size, "Uploaded to storage");

        Ok(self.address(key))
    }

    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let result = self.store.get(&self.path(key)).await?;
        Ok(result.bytes().await?)
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.store.head(&self.path(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Store for StorageClient {
    async fn put(&self, key: &str, data: Bytes) -> std::result::Result<String, StoreError> {
        self.upload(key, data).await.map_err(|err| {
            let message = err.to_string();
            if err.is_permanent() {
                StoreError::Rejected {
                    key: key.to_string(),
                    message,
                }
            } else {
                StoreError::Unavailable {
                    key: key.to_string(),
                    message,
                }
            }
        })
    }
}
