use async_trait::async_trait;
use bytes::Bytes;

use super::dead_letter::DeadLetterRecord;
use super::error::{FetchError, SinkError, StoreError, TranscodeError};

/// Retrieve the raw bytes behind an image URL
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Turn raw image bytes into the bounded, re-encoded representation
#[async_trait]
pub trait Transcode: Send + Sync {
    async fn transcode(&self, raw: Bytes) -> Result<Bytes, TranscodeError>;
}

/// Durably store a blob under `key` and return its public address
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<String, StoreError>;
}

/// Result sink: replace the compressed image list recorded for a task.
///
/// Calling it twice with the same arguments must leave the same state.
#[async_trait]
pub trait Commit: Send + Sync {
    async fn commit(&self, task_id: &str, addresses: &[String]) -> Result<(), SinkError>;
}

/// Dead-letter sink for tasks that could not be fully committed
#[async_trait]
pub trait RecordDeadLetter: Send + Sync {
    async fn record(&self, record: &DeadLetterRecord) -> Result<(), SinkError>;
}
