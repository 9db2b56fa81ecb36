//! Dead-letter records for tasks that could not be fully committed
//!
//! A record is written once and never mutated. If the dead-letter sink itself
//! fails there is no secondary fallback: the full record is logged at error
//! level and the metric `dead_letter_failures` is incremented. That log line is
//! the last copy of the task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::error::ErrorKind;
use super::outcome::ItemFailure;
use super::task::Task;
use super::traits::RecordDeadLetter;
use crate::observability::Metrics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub source_url: String,
    pub kind: ErrorKind,
    pub attempts: u32,
    pub error: String,
}

impl From<&ItemFailure> for FailedItem {
    fn from(failure: &ItemFailure) -> Self {
        Self {
            source_url: failure.source_url.clone(),
            kind: failure.kind,
            attempts: failure.attempts,
            error: failure.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub task_id: String,
    pub original_task: Task,
    pub error: String,
    pub error_kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<Vec<String>>,
    #[serde(default)]
    pub failed_items: Vec<FailedItem>,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl DeadLetterRecord {
    pub fn new(
        task: &Task,
        error: String,
        error_kind: ErrorKind,
        partial_results: Option<Vec<String>>,
        failures: &[ItemFailure],
        retry_count: u32,
    ) -> Self {
        Self {
            task_id: task.task_id.clone(),
            original_task: task.clone(),
            error,
            error_kind,
            partial_results,
            failed_items: failures.iter().map(FailedItem::from).collect(),
            timestamp: Utc::now(),
            retry_count,
        }
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// Hand a record to the dead-letter sink. Never fails from the caller's view.
pub async fn dispatch(sink: &dyn RecordDeadLetter, record: &DeadLetterRecord, metrics: &Metrics) {
    match sink.record(record).await {
        Ok(()) => {
            metrics.task_dead_lettered();
            warn!(
                task_id = %record.task_id,
                error_kind = %record.error_kind,
                error = %record.error,
                partial_results = record.partial_results.as_ref().map_or(0, Vec::len),
                "Task routed to dead-letter sink"
            );
        }
        Err(sink_error) => {
            metrics.dead_letter_failed();
            let payload = serde_json::to_string(record)
                .unwrap_or_else(|e| format!("<unserializable record: {e}>"));
            error!(
                task_id = %record.task_id,
                error = %sink_error,
                record = %payload,
                "Failed to write dead-letter record"
            );
        }
    }
}
