use bon::Builder;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::dead_letter::{self, DeadLetterRecord};
use super::error::{ErrorKind, TaskError};
use super::outcome::{ItemFailure, ItemOutcome, ItemResult, ItemSuccess, TaskOutcome};
use super::retry::RetryingItemProcessor;
use super::task::Task;
use super::traits::{Commit, RecordDeadLetter};
use crate::observability::Metrics;

/// Images of one task processed at the same time
pub const DEFAULT_ITEM_CONCURRENCY: usize = 4;

/// How a task finished when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The task carried no image URLs
    Empty,
    Committed { images: usize },
    PartiallyCommitted { images: usize, failed: usize },
}

/// Runs one task through the item processor and routes the result.
///
/// Outcomes:
/// - every image stored: commit, `Completion::Committed`
/// - some stored: commit the subset, warn, `Completion::PartiallyCommitted`
/// - commit rejected: dead-letter with the stored subset, `TaskError::Persistence`
/// - nothing stored: dead-letter without partial results, `TaskError::AllFailed`
/// - shutdown interrupted an item: no sink calls, `TaskError::Interrupted`
#[derive(Builder)]
pub struct TaskExecutor {
    processor: Arc<RetryingItemProcessor>,
    results: Arc<dyn Commit>,
    dead_letters: Arc<dyn RecordDeadLetter>,
    #[builder(default = DEFAULT_ITEM_CONCURRENCY)]
    item_concurrency: usize,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl TaskExecutor {
    pub async fn execute(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<Completion, TaskError> {
        if task.image_urls.is_empty() {
            info!(task_id = %task.task_id, "Task has no images, nothing to commit");
            return Ok(Completion::Empty);
        }

        info!(
            task_id = %task.task_id,
            images = task.image_urls.len(),
            "Processing image task"
        );

        let outcomes = self.process_items(task, cancel).await;
        debug_assert_eq!(outcomes.len(), task.image_urls.len());

        if outcomes.iter().any(ItemOutcome::is_cancelled) {
            self.metrics.task_interrupted();
            warn!(task_id = %task.task_id, "Task interrupted by shutdown, nothing committed");
            return Err(TaskError::Interrupted {
                task_id: task.task_id.clone(),
            });
        }

        let retry_count = outcomes.iter().map(ItemOutcome::attempts).max().unwrap_or(0);

        match TaskOutcome::aggregate(outcomes) {
            TaskOutcome::AllSucceeded { successes } => {
                self.commit(task, &successes, &[], retry_count).await?;
                self.metrics.task_committed();
                Ok(Completion::Committed {
                    images: successes.len(),
                })
            }
            TaskOutcome::PartialSuccess {
                successes,
                failures,
            } => {
                self.commit(task, &successes, &failures, retry_count).await?;
                self.metrics.task_partially_committed();
                warn!(
                    task_id = %task.task_id,
                    success_count = successes.len(),
                    error_count = failures.len(),
                    failed_urls = ?failures.iter().map(|f| f.source_url.as_str()).collect::<Vec<_>>(),
                    "Partial success processing images"
                );
                Ok(Completion::PartiallyCommitted {
                    images: successes.len(),
                    failed: failures.len(),
                })
            }
            TaskOutcome::AllFailed { failures } => {
                let error = TaskError::AllFailed {
                    task_id: task.task_id.clone(),
                    failures: failures.len(),
                    summary: summarize(&failures),
                };
                error!(task_id = %task.task_id, error = %error, "All images failed to process");

                let kind = failures
                    .first()
                    .map_or(ErrorKind::TerminalContent, |failure| failure.kind);
                let record =
                    DeadLetterRecord::new(task, error.to_string(), kind, None, &failures, retry_count);
                dead_letter::dispatch(self.dead_letters.as_ref(), &record, &self.metrics).await;

                Err(error)
            }
        }
    }

    /// Fan the URLs out with at most `item_concurrency` in flight
    async fn process_items(&self, task: &Task, cancel: &CancellationToken) -> Vec<ItemOutcome> {
        let limit = self.item_concurrency.max(1);

        let outcomes: Vec<ItemOutcome> = stream::iter(task.image_urls.iter().cloned().enumerate())
            .map(|(position, url)| async move {
                let result = self.processor.process(&task.task_id, &url, cancel).await;
                ItemOutcome::new(position, url, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        for outcome in &outcomes {
            if outcome.is_cancelled() {
                continue;
            }
            match &outcome.result {
                ItemResult::Success { .. } => self.metrics.item_succeeded(),
                ItemResult::Failure { .. } => self.metrics.item_failed(),
            }
        }

        outcomes
    }

    async fn commit(
        &self,
        task: &Task,
        successes: &[ItemSuccess],
        failures: &[ItemFailure],
        retry_count: u32,
    ) -> Result<(), TaskError> {
        let addresses: Vec<String> = successes.iter().map(|s| s.address.clone()).collect();

        match self.results.commit(&task.task_id, &addresses).await {
            Ok(()) => {
                info!(
                    task_id = %task.task_id,
                    compressed_urls = ?addresses,
                    "Committed compressed images"
                );
                Ok(())
            }
            Err(source) => {
                error!(
                    task_id = %task.task_id,
                    error = %source,
                    "Failed to commit compressed images"
                );

                let record = DeadLetterRecord::new(
                    task,
                    source.to_string(),
                    ErrorKind::PersistenceFailure,
                    Some(addresses.clone()),
                    failures,
                    retry_count,
                );
                dead_letter::dispatch(self.dead_letters.as_ref(), &record, &self.metrics).await;

                Err(TaskError::Persistence {
                    task_id: task.task_id.clone(),
                    committed: addresses.len(),
                    source,
                })
            }
        }
    }
}

fn summarize(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({}, {} attempt(s)): {}", f.source_url, f.kind, f.attempts, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
