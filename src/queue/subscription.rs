use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::store::{FjallQueue, Result};

/// One message handed to a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// Grouped, offset-tracked stream of task payloads
///
/// Delivery is at-least-once: a message stays deliverable until it is
/// acknowledged, and acknowledgements are expected in offset order.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Next unacknowledged messages, oldest first
    async fn poll(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Mark a delivery (and everything before it) as handled
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}

/// A consumer group's view of one channel
pub struct Subscription {
    queue: Arc<FjallQueue>,
    channel: String,
    group: String,
}

impl Subscription {
    pub fn new(queue: Arc<FjallQueue>, channel: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            queue,
            channel: channel.into(),
            group: group.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Messages published but not yet acknowledged by this group
    pub fn lag(&self) -> Result<u64> {
        let published = self.queue.published(&self.channel)?;
        let committed = self.queue.committed_offset(&self.group, &self.channel)?;
        Ok(published.saturating_sub(committed))
    }
}

#[async_trait]
impl TaskSource for Subscription {
    async fn poll(&self, max: usize) -> Result<Vec<Delivery>> {
        let from = self.queue.committed_offset(&self.group, &self.channel)?;
        let deliveries: Vec<Delivery> = self
            .queue
            .read(&self.channel, from, max)?
            .into_iter()
            .map(|(offset, payload)| Delivery { offset, payload })
            .collect();

        if !deliveries.is_empty() {
            debug!(
                channel = %self.channel,
                group = %self.group,
                from,
                count = deliveries.len(),
                "Polled deliveries"
            );
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.queue
            .commit_offset(&self.group, &self.channel, delivery.offset + 1)
    }
}
