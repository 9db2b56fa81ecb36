//! Image worker
//!
//! Polls task payloads from a [`TaskSource`](crate::queue::TaskSource), runs each
//! through the [`TaskExecutor`](crate::pipeline::TaskExecutor) and acknowledges
//! it according to the configured [`AckPolicy`].

pub mod http;
pub mod runner;
pub mod transcode;

pub use crate::config::AckPolicy;
pub use http::{HttpConfig, HttpFetcher};
pub use runner::{Handled, Worker, WorkerError};
pub use transcode::{TranscodeConfig, Transcoder};

use std::time::Duration;

use crate::config::WorkerSettings;

/// Worker loop configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Deliveries fetched per poll
    pub batch_size: usize,
    /// Idle wait when the source is empty
    pub poll_interval: Duration,
    pub ack_policy: AckPolicy,
    /// Wait before re-polling a delivery that was left unacknowledged
    pub redelivery_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&WorkerSettings::default())
    }
}

impl From<&WorkerSettings> for WorkerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            poll_interval: settings.poll_interval(),
            ack_policy: settings.ack_policy,
            redelivery_delay: settings.redelivery_delay(),
        }
    }
}
