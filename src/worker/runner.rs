//! Task runner - consumes deliveries and drives them through the executor

use bon::Builder;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{AckPolicy, WorkerConfig};
use crate::observability::Metrics;
use crate::pipeline::{Task, TaskError, TaskExecutor};
use crate::queue::{Delivery, QueueError, TaskSource};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to poll task source: {0}")]
    Poll(#[source] QueueError),

    #[error("Failed to acknowledge offset {offset}: {source}")]
    Ack {
        offset: u64,
        #[source]
        source: QueueError,
    },
}

/// What happened to a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Acked,
    /// Left unacknowledged; the source will hand it out again
    Held,
}

#[derive(Builder)]
pub struct Worker {
    source: Arc<dyn TaskSource>,
    executor: Arc<TaskExecutor>,
    #[builder(default)]
    config: WorkerConfig,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl Worker {
    /// Poll and process until `cancel` fires.
    ///
    /// Deliveries are handled one at a time in offset order. A held delivery
    /// ends the batch so the next poll starts from it again.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            batch_size = self.config.batch_size,
            ack_policy = ?self.config.ack_policy,
            "Worker started"
        );

        while !cancel.is_cancelled() {
            let deliveries = match self.source.poll(self.config.batch_size.max(1)).await {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    error!(error = %WorkerError::Poll(e), "Polling failed, backing off");
                    sleep_or_cancel(self.config.poll_interval, &cancel).await;
                    continue;
                }
            };

            if deliveries.is_empty() {
                sleep_or_cancel(self.config.poll_interval, &cancel).await;
                continue;
            }

            for delivery in &deliveries {
                if cancel.is_cancelled() {
                    break;
                }

                let handled = match self.handle(delivery, &cancel).await {
                    Ok(handled) => handled,
                    Err(e) => {
                        error!(error = %e, "Delivery not acknowledged");
                        Handled::Held
                    }
                };

                if handled == Handled::Held {
                    sleep_or_cancel(self.config.redelivery_delay, &cancel).await;
                    break;
                }
            }
        }

        info!("Worker stopped");
    }

    /// Process one delivery and acknowledge it when the policy allows
    pub async fn handle(
        &self,
        delivery: &Delivery,
        cancel: &CancellationToken,
    ) -> Result<Handled, WorkerError> {
        let task = match Task::decode(&delivery.payload) {
            Ok(task) => task,
            Err(e) => {
                self.metrics.task_undecodable();
                error!(
                    offset = delivery.offset,
                    payload = %String::from_utf8_lossy(&delivery.payload),
                    error = %e,
                    "Failed to decode task, skipping"
                );
                return self.ack(delivery).await;
            }
        };

        match self.executor.execute(&task, cancel).await {
            Ok(completion) => {
                debug!(task_id = %task.task_id, offset = delivery.offset, ?completion, "Task completed");
                self.ack(delivery).await
            }
            Err(TaskError::Interrupted { .. }) => {
                info!(
                    task_id = %task.task_id,
                    offset = delivery.offset,
                    "Task interrupted, leaving it for redelivery"
                );
                Ok(Handled::Held)
            }
            Err(e) => match self.config.ack_policy {
                AckPolicy::AckAfterDeadLetter => {
                    warn!(task_id = %task.task_id, error = %e, "Task dead-lettered, acknowledging");
                    self.ack(delivery).await
                }
                AckPolicy::Redeliver => {
                    warn!(task_id = %task.task_id, error = %e, "Task failed, leaving it for redelivery");
                    Ok(Handled::Held)
                }
            },
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<Handled, WorkerError> {
        self.source
            .ack(delivery)
            .await
            .map_err(|source| WorkerError::Ack {
                offset: delivery.offset,
                source,
            })?;
        Ok(Handled::Acked)
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.cancelled() => {}
    }
}
