use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, ProcessError};
use super::retry::Stored;

/// What happened to one image URL during one task invocation
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    /// Index of the URL in the task's list
    pub position: usize,
    pub source_url: String,
    pub result: ItemResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    Success {
        address: String,
        attempts: u32,
    },
    Failure {
        kind: ErrorKind,
        attempts: u32,
        error: String,
    },
}

impl ItemOutcome {
    pub fn new(position: usize, source_url: String, result: Result<Stored, ProcessError>) -> Self {
        let result = match result {
            Ok(stored) => ItemResult::Success {
                address: stored.address,
                attempts: stored.attempts,
            },
            Err(error) => ItemResult::Failure {
                kind: error.kind(),
                attempts: error.attempts,
                error: error.source.to_string(),
            },
        };

        Self {
            position,
            source_url,
            result,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.result,
            ItemResult::Failure {
                kind: ErrorKind::Cancelled,
                ..
            }
        )
    }

    pub fn attempts(&self) -> u32 {
        match self.result {
            ItemResult::Success { attempts, .. } | ItemResult::Failure { attempts, .. } => attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSuccess {
    pub position: usize,
    pub source_url: String,
    pub address: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub position: usize,
    pub source_url: String,
    pub kind: ErrorKind,
    pub attempts: u32,
    pub error: String,
}

/// Classification of a whole task once every item has an outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    AllSucceeded {
        successes: Vec<ItemSuccess>,
    },
    PartialSuccess {
        successes: Vec<ItemSuccess>,
        failures: Vec<ItemFailure>,
    },
    AllFailed {
        failures: Vec<ItemFailure>,
    },
}

impl TaskOutcome {
    /// Partition item outcomes, restoring input order regardless of completion order
    pub fn aggregate(mut outcomes: Vec<ItemOutcome>) -> Self {
        outcomes.sort_by_key(|outcome| outcome.position);

        let mut successes = Vec::new();
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                ItemResult::Success { address, attempts } => successes.push(ItemSuccess {
                    position: outcome.position,
                    source_url: outcome.source_url,
                    address,
                    attempts,
                }),
                ItemResult::Failure {
                    kind,
                    attempts,
                    error,
                } => failures.push(ItemFailure {
                    position: outcome.position,
                    source_url: outcome.source_url,
                    kind,
                    attempts,
                    error,
                }),
            }
        }

        match (successes.is_empty(), failures.is_empty()) {
            (false, true) | (true, true) => TaskOutcome::AllSucceeded { successes },
            (false, false) => TaskOutcome::PartialSuccess {
                successes,
                failures,
            },
            (true, false) => TaskOutcome::AllFailed { failures },
        }
    }
}
