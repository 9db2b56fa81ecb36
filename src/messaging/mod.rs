//! Message publishing abstraction
//!
//! The worker publishes dead-letter records (and the CLI publishes tasks)
//! through [`MessageProducer`]. The shipped producer is the embedded
//! [`FjallQueue`](crate::queue::FjallQueue).

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::pipeline::{DeadLetterRecord, RecordDeadLetter, SinkError};
use crate::queue::FjallQueue;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Publish to '{channel}' failed: {message}")]
    PublishFailed { channel: String, message: String },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

/// Publishes byte payloads to named channels
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Publish a message and return its offset in the channel
    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<u64>;

    /// Health check
    async fn health(&self) -> bool;
}

#[async_trait]
impl MessageProducer for FjallQueue {
    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<u64> {
        FjallQueue::publish(self, channel, &message).map_err(|e| MessagingError::PublishFailed {
            channel: channel.to_string(),
            message: e.to_string(),
        })
    }

    async fn health(&self) -> bool {
        self.health_check().is_ok()
    }
}

/// Dead-letter sink that publishes JSON records to a channel
pub struct ChannelDeadLetterSink {
    producer: Arc<dyn MessageProducer>,
    channel: String,
}

impl ChannelDeadLetterSink {
    pub fn new(producer: Arc<dyn MessageProducer>, channel: impl Into<String>) -> Self {
        Self {
            producer,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl RecordDeadLetter for ChannelDeadLetterSink {
    async fn record(&self, record: &DeadLetterRecord) -> std::result::Result<(), SinkError> {
        let payload = record.to_payload().map_err(MessagingError::from)?;
        let offset = self.producer.publish(&self.channel, payload).await?;
        tracing::debug!(
            task_id = %record.task_id,
            channel = %self.channel,
            offset,
            "Dead-letter record published"
        );
        Ok(())
    }
}
