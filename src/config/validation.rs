use super::models::{Config, StorageProvider};
use crate::queue::is_valid_channel_name;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("JPEG quality must be within 1..=100, got {0}")]
    InvalidQuality(u8),

    #[error("Task channel and dead-letter channel must differ (both '{0}')")]
    DeadLetterChannelCollision(String),

    #[error("Channel and consumer group names must not be empty")]
    EmptyChannelName,

    #[error("Invalid channel name '{0}': only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidChannelName(String),

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("Storage provider is S3 but no region or endpoint is configured")]
    MissingS3Location,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_transcode(config)?;
    validate_queue(config)?;
    validate_storage(config)?;
    Ok(())
}

fn positive(value: u64, field: &'static str) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::NotPositive { field });
    }
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    positive(config.worker.batch_size as u64, "worker.batch_size")?;
    positive(config.worker.item_concurrency as u64, "worker.item_concurrency")?;
    positive(u64::from(config.retry.max_attempts), "retry.max_attempts")?;
    positive(config.fetch.request_timeout_ms, "fetch.request_timeout_ms")?;
    Ok(())
}

fn validate_transcode(config: &Config) -> Result<(), ValidationError> {
    positive(u64::from(config.transcode.max_dimension), "transcode.max_dimension")?;

    if !(1..=100).contains(&config.transcode.quality) {
        return Err(ValidationError::InvalidQuality(config.transcode.quality));
    }
    Ok(())
}

fn validate_queue(config: &Config) -> Result<(), ValidationError> {
    let queue = &config.queue;

    if queue.task_channel.is_empty()
        || queue.dead_letter_channel.is_empty()
        || queue.consumer_group.is_empty()
    {
        return Err(ValidationError::EmptyChannelName);
    }

    for channel in [&queue.task_channel, &queue.dead_letter_channel] {
        if !is_valid_channel_name(channel) {
            return Err(ValidationError::InvalidChannelName(channel.clone()));
        }
    }

    // Dead letters would be fed straight back into the worker
    if queue.task_channel == queue.dead_letter_channel {
        return Err(ValidationError::DeadLetterChannelCollision(
            queue.task_channel.clone(),
        ));
    }
    Ok(())
}

/// Validate storage credentials when provider is S3
fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::S3 {
        if config.storage.access_key.is_none() || config.storage.secret_key.is_none() {
            return Err(ValidationError::MissingS3Credentials);
        }
        if config.storage.region.is_none() && config.storage.endpoint.is_none() {
            return Err(ValidationError::MissingS3Location);
        }
    }

    Ok(())
}
