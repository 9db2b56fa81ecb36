use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub transcode: TranscodeSettings,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// What happens to a delivery whose task was dead-lettered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Acknowledge once the dead-letter record was handed off
    #[default]
    AckAfterDeadLetter,
    /// Leave the delivery unacknowledged so the whole task is retried
    Redeliver,
}

/// Worker loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_item_concurrency")]
    pub item_concurrency: usize,
    #[serde(default)]
    pub ack_policy: AckPolicy,
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            item_concurrency: default_item_concurrency(),
            ack_policy: AckPolicy::default(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
        }
    }
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_item_concurrency() -> usize {
    crate::pipeline::DEFAULT_ITEM_CONCURRENCY
}

fn default_redelivery_delay_ms() -> u64 {
    5_000
}

/// Per-image retry policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_interval_ms: default_base_interval_ms(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> crate::pipeline::RetryPolicy {
        crate::pipeline::RetryPolicy {
            max_attempts: self.max_attempts,
            base_interval: Duration::from_millis(self.base_interval_ms),
        }
    }
}

fn default_max_attempts() -> u32 {
    crate::pipeline::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_base_interval_ms() -> u64 {
    5_000
}

/// Outbound HTTP settings for image downloads
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound on a downloaded body, e.g. "20MB"
    pub max_body_bytes: Option<ByteSize>,
    pub proxy: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
            max_body_bytes: None,
            proxy: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("imagepress/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeSettings {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            quality: default_quality(),
        }
    }
}

fn default_max_dimension() -> u32 {
    1200
}

fn default_quality() -> u8 {
    80
}

/// Embedded channel log used as task source and dead-letter destination
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,
    #[serde(default = "default_task_channel")]
    pub task_channel: String,
    #[serde(default = "default_dead_letter_channel")]
    pub dead_letter_channel: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            task_channel: default_task_channel(),
            dead_letter_channel: default_dead_letter_channel(),
            consumer_group: default_consumer_group(),
        }
    }
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("data/queue")
}

fn default_task_channel() -> String {
    "image_processing".to_string()
}

fn default_dead_letter_channel() -> String {
    "image_processing_dlq".to_string()
}

fn default_consumer_group() -> String {
    "image_processing_group".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    S3,
    #[default]
    Local,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub endpoint: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
    pub region: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Base of returned addresses; derived from the provider when unset
    pub public_base_url: Option<String>,
    /// Root directory for the `local` provider
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            bucket: default_bucket(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: None,
            key_prefix: default_key_prefix(),
            public_base_url: None,
            local_root: default_local_root(),
        }
    }
}

fn default_bucket() -> String {
    "imagepress".to_string()
}

fn default_key_prefix() -> String {
    "products".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from("data/objects")
}

/// Status endpoint of the worker process
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_status_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_status_enabled(),
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_status_enabled() -> bool {
    true
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090))
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
