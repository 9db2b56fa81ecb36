//! Task processing pipeline
//!
//! A [`Task`] names a record and the source images to compress for it. The
//! [`TaskExecutor`] fans the image URLs out to the [`RetryingItemProcessor`]
//! under a fixed concurrency cap, aggregates every [`ItemOutcome`], then either
//! commits the produced addresses through a [`Commit`] sink or routes the task
//! to a [`RecordDeadLetter`] sink.
//!
//! Collaborators are injected as capability traits ([`Fetch`], [`Transcode`],
//! [`Store`], [`Commit`], [`RecordDeadLetter`]) so backends can be swapped and
//! faked in tests.
//!
//! ## Example
//!
//! ```rust,ignore
//! let processor = RetryingItemProcessor::builder()
//!     .fetcher(Arc::new(HttpFetcher::new(HttpConfig::default(), None)?))
//!     .transcoder(Arc::new(Transcoder::default()))
//!     .store(Arc::new(StorageClient::in_memory()))
//!     .build();
//!
//! let executor = TaskExecutor::builder()
//!     .processor(Arc::new(processor))
//!     .results(Arc::new(ledger))
//!     .dead_letters(Arc::new(dead_letter_sink))
//!     .build();
//!
//! executor.execute(&task, &CancellationToken::new()).await?;
//! ```

pub mod classify;
pub mod dead_letter;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod retry;
pub mod task;
pub mod traits;

pub use classify::{Disposition, classify};
pub use dead_letter::{DeadLetterRecord, FailedItem};
pub use error::{
    ErrorKind, FetchError, ItemError, ProcessError, SinkError, StoreError, TaskError,
    TranscodeError,
};
pub use executor::{Completion, DEFAULT_ITEM_CONCURRENCY, TaskExecutor};
pub use outcome::{ItemFailure, ItemOutcome, ItemResult, ItemSuccess, TaskOutcome};
pub use retry::{RetryPolicy, RetryingItemProcessor, Stored, object_key};
pub use task::{DecodeError, Task};
pub use traits::{Commit, Fetch, RecordDeadLetter, Store, Transcode};
