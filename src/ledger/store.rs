use std::path::Path;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::pipeline::{Commit, SinkError};

use super::error::{LedgerError, Result};
use super::partitions::{decode_task_key, encode_task_key};

/// Compressed image list recorded for a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub task_id: String,
    pub compressed_images: Vec<String>,
    /// RFC 3339
    pub updated_at: String,
}

/// Fjall-backed result sink: task id -> compressed image addresses
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    images: PartitionHandle,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let images = keyspace.open_partition("images", PartitionCreateOptions::default())?;

        Ok(Self { keyspace, images })
    }

    /// Replace the image list for a task; the previous list is discarded
    pub fn replace_images(&self, task_id: &str, addresses: &[String]) -> Result<ImageRecord> {
        let record = ImageRecord {
            task_id: task_id.to_string(),
            compressed_images: addresses.to_vec(),
            updated_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
        };

        self.images
            .insert(encode_task_key(task_id), serde_json::to_vec(&record)?)?;
        debug!(task_id, images = addresses.len(), "Replaced compressed images");
        Ok(record)
    }

    pub fn get(&self, task_id: &str) -> Result<Option<ImageRecord>> {
        match self.images.get(encode_task_key(task_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Records in key order, up to `limit`
    pub fn list(&self, limit: usize) -> Result<Vec<ImageRecord>> {
        let mut records = Vec::new();
        for item in self.images.iter().take(limit) {
            let (key, value) = item?;
            if decode_task_key(&key).is_none() {
                return Err(LedgerError::InvalidKey(
                    String::from_utf8_lossy(&key).into_owned(),
                ));
            }
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Touch the images partition without scanning it
    pub fn health_check(&self) -> Result<()> {
        let _ = self.images.first_key_value()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut task_count = 0;
        let mut image_count = 0;

        for item in self.images.iter() {
            let (_, value) = item?;
            let record: ImageRecord = serde_json::from_slice(&value)?;
            task_count += 1;
            image_count += record.compressed_images.len();
        }

        Ok(StoreStats {
            task_count,
            image_count,
        })
    }
}

#[async_trait]
impl Commit for FjallStore {
    async fn commit(&self, task_id: &str, addresses: &[String]) -> std::result::Result<(), SinkError> {
        self.replace_images(task_id, addresses)?;
        self.persist()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub task_count: usize,
    pub image_count: usize,
}
