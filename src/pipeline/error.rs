use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Boxed error returned by the result and dead-letter sinks
pub type SinkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure taxonomy shared by items, tasks and dead-letter records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network blip worth another attempt
    TransientTransport,
    /// Malformed or undecodable data
    TerminalContent,
    /// Permanent rejection by a remote endpoint
    TerminalTransport,
    /// Result sink commit failed after items were processed
    PersistenceFailure,
    /// The task payload itself was malformed
    DecodeFailure,
    /// Shutdown stopped the item before it could finish
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientTransport => "transient_transport",
            ErrorKind::TerminalContent => "terminal_content",
            ErrorKind::TerminalTransport => "terminal_transport",
            ErrorKind::PersistenceFailure => "persistence_failure",
            ErrorKind::DecodeFailure => "decode_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(io::ErrorKind),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error("transport error: {message}")]
    Transport { message: String, temporary: bool },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout => ErrorKind::TransientTransport,
            FetchError::Connection(kind) if is_transient_io(*kind) => {
                ErrorKind::TransientTransport
            }
            FetchError::Connection(_) => ErrorKind::TerminalTransport,
            // Gateway hiccups and throttling clear up; everything else is permanent
            FetchError::Status { status } => match status {
                408 | 429 | 502 | 503 | 504 => ErrorKind::TransientTransport,
                _ => ErrorKind::TerminalTransport,
            },
            FetchError::BodyTooLarge { .. } | FetchError::InvalidUrl(_) => {
                ErrorKind::TerminalContent
            }
            FetchError::Transport { temporary: true, .. } => ErrorKind::TransientTransport,
            FetchError::Transport { .. } => ErrorKind::TerminalTransport,
        }
    }
}

/// I/O failure kinds that indicate a dropped or stalled connection
pub fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

#[derive(Debug, Clone, Error)]
pub enum TranscodeError {
    #[error("cannot decode image: {0}")]
    Decode(String),

    #[error("cannot encode image: {0}")]
    Encode(String),

    #[error("transcode worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("object store unavailable for {key}: {message}")]
    Unavailable { key: String, message: String },

    #[error("object store rejected {key}: {message}")]
    Rejected { key: String, message: String },
}

/// Failure of a single fetch -> transcode -> store attempt
#[derive(Debug, Clone, Error)]
pub enum ItemError {
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("processing failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("upload failed: {0}")]
    Store(#[from] StoreError),

    #[error("cancelled before attempt {attempt}")]
    Cancelled { attempt: u32 },
}

impl ItemError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ItemError::Fetch(e) => e.kind(),
            ItemError::Transcode(_) => ErrorKind::TerminalContent,
            ItemError::Store(StoreError::Unavailable { .. }) => ErrorKind::TransientTransport,
            ItemError::Store(StoreError::Rejected { .. }) => ErrorKind::TerminalTransport,
            ItemError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}

/// Terminal per-item failure: the last cause plus where and how often it was tried
#[derive(Debug, Clone, Error)]
#[error("processing {source_url} for task {task_id} failed after {attempts} attempt(s): {source}")]
pub struct ProcessError {
    pub task_id: String,
    pub source_url: String,
    pub attempts: u32,
    #[source]
    pub source: ItemError,
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Task-level failure reported back to the consumer loop
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to commit {committed} image(s) for task {task_id}: {source}")]
    Persistence {
        task_id: String,
        committed: usize,
        #[source]
        source: SinkError,
    },

    #[error("all {failures} image(s) failed for task {task_id}: {summary}")]
    AllFailed {
        task_id: String,
        failures: usize,
        summary: String,
    },

    #[error("task {task_id} interrupted by shutdown")]
    Interrupted { task_id: String },
}

impl TaskError {
    pub fn task_id(&self) -> &str {
        match self {
            TaskError::Persistence { task_id, .. }
            | TaskError::AllFailed { task_id, .. }
            | TaskError::Interrupted { task_id } => task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kinds() {
        assert_eq!(FetchError::Timeout.kind(), ErrorKind::TransientTransport);
        assert_eq!(
            FetchError::Connection(io::ErrorKind::ConnectionReset).kind(),
            ErrorKind::TransientTransport
        );
        assert_eq!(
            FetchError::Connection(io::ErrorKind::ConnectionRefused).kind(),
            ErrorKind::TerminalTransport
        );
        assert_eq!(
            FetchError::Status { status: 404 }.kind(),
            ErrorKind::TerminalTransport
        );
        assert_eq!(
            FetchError::Status { status: 503 }.kind(),
            ErrorKind::TransientTransport
        );
        assert_eq!(
            FetchError::BodyTooLarge { limit: 10 }.kind(),
            ErrorKind::TerminalContent
        );
    }

    #[test]
    fn test_item_error_kinds() {
        let decode: ItemError = TranscodeError::Decode("bad header".into()).into();
        assert_eq!(decode.kind(), ErrorKind::TerminalContent);

        let unavailable: ItemError = StoreError::Unavailable {
            key: "k".into(),
            message: "503".into(),
        }
        .into();
        assert_eq!(unavailable.kind(), ErrorKind::TransientTransport);

        let rejected: ItemError = StoreError::Rejected {
            key: "k".into(),
            message: "no such bucket".into(),
        }
        .into();
        assert_eq!(rejected.kind(), ErrorKind::TerminalTransport);
    }

    #[test]
    fn test_process_error_display() {
        let error = ProcessError {
            task_id: "p1".into(),
            source_url: "http://x/a.jpg".into(),
            attempts: 3,
            source: FetchError::Connection(io::ErrorKind::ConnectionReset).into(),
        };
        let message = error.to_string();
        assert!(message.contains("p1"));
        assert!(message.contains("3 attempt(s)"));
        assert!(message.contains("http://x/a.jpg"));
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::PersistenceFailure).unwrap();
        assert_eq!(json, "\"persistence_failure\"");
    }
}
