//! Retry classification, kept free of I/O so the policy can be tested alone.

use super::error::{ErrorKind, ItemError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable,
    Terminal,
}

/// Decide whether a failed attempt is worth repeating
pub fn classify(error: &ItemError) -> Disposition {
    match error.kind() {
        ErrorKind::TransientTransport => Disposition::Retryable,
        _ => Disposition::Terminal,
    }
}
