use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed task payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("task payload has an empty task_id")]
    MissingTaskId,
}

/// Unit of work: the record to update and the source images to process.
///
/// `task_id` also names the downstream record the compressed image list is
/// written to. Producers that still emit `product_id` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "product_id")]
    pub task_id: String,
    pub image_urls: Vec<String>,
}

impl Task {
    pub fn new(task_id: impl Into<String>, image_urls: Vec<String>) -> Self {
        Self {
            task_id: task_id.into(),
            image_urls,
        }
    }

    /// Decode a task from its wire payload (JSON)
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let task: Task = serde_json::from_slice(payload)?;
        if task.task_id.trim().is_empty() {
            return Err(DecodeError::MissingTaskId);
        }
        Ok(task)
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
