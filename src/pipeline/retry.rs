//! Per-image processing with a bounded, linear-backoff retry loop

use bon::Builder;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::classify::{Disposition, classify};
use super::error::{ItemError, ProcessError};
use super::traits::{Fetch, Store, Transcode};
use crate::observability::Metrics;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_interval: DEFAULT_BASE_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Wait imposed after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_interval.saturating_mul(attempt)
    }
}

/// Address produced for one image, with the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    pub address: String,
    pub attempts: u32,
}

/// Object key for the compressed copy of `source_url`.
///
/// Derived from the task and the source URL only, so a retried attempt or a
/// redelivered task overwrites the same object instead of leaking new ones.
pub fn object_key(task_id: &str, source_url: &str) -> String {
    // Attempts stay self-contained because each put replaces the whole object atomically
    let name = Uuid::new_v5(&Uuid::NAMESPACE_URL, source_url.as_bytes());
    format!("{task_id}/{name}.jpg")
}

/// Drives fetch -> transcode -> store for a single image URL
#[derive(Builder)]
pub struct RetryingItemProcessor {
    fetcher: Arc<dyn Fetch>,
    transcoder: Arc<dyn Transcode>,
    store: Arc<dyn Store>,
    #[builder(default)]
    policy: RetryPolicy,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl RetryingItemProcessor {
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Process one image, retrying transient failures.
    ///
    /// Cancellation is observed before every attempt and before every
    /// backoff sleep; an attempt already running is allowed to finish.
    pub async fn process(
        &self,
        task_id: &str,
        source_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Stored, ProcessError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let fail = |attempts: u32, source: ItemError| ProcessError {
            task_id: task_id.to_string(),
            source_url: source_url.to_string(),
            attempts,
            source,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            if cancel.is_cancelled() {
                return Err(fail(attempt - 1, ItemError::Cancelled { attempt }));
            }

            let error = match self.attempt(task_id, source_url).await {
                Ok(address) => {
                    if attempt > 1 {
                        debug!(task_id, url = source_url, attempt, "Image processed after retry");
                    }
                    return Ok(Stored {
                        address,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            warn!(
                task_id,
                url = source_url,
                attempt,
                kind = %error.kind(),
                error = %error,
                "Image processing attempt failed"
            );

            if classify(&error) == Disposition::Terminal {
                return Err(fail(attempt, error));
            }

            if attempt >= max_attempts {
                warn!(task_id, url = source_url, attempts = attempt, "Retries exhausted");
                return Err(fail(attempt, error));
            }

            if cancel.is_cancelled() {
                return Err(fail(attempt, ItemError::Cancelled { attempt: attempt + 1 }));
            }

            self.metrics.item_retried();
            let delay = self.policy.backoff(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(fail(attempt, ItemError::Cancelled { attempt: attempt + 1 }));
                }
            }
        }
    }

    /// One self-contained attempt: fresh download, in-memory transcode, store
    async fn attempt(&self, task_id: &str, source_url: &str) -> Result<String, ItemError> {
        let raw = self.fetcher.fetch(source_url).await?;
        let size = raw.len();

        let encoded = self.transcoder.transcode(raw).await?;
        debug!(
            task_id,
            url = source_url,
            original_size = size,
            compressed_size = encoded.len(),
            "Image transcoded"
        );

        let key = object_key(task_id, source_url);
        let address = self.store.put(&key, encoded).await?;
        Ok(address)
    }
}
