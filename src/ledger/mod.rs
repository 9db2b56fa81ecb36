/// Fjall-backed result ledger
///
/// Holds, per task, the list of compressed image addresses produced by the
/// last successful commit. Writes replace the whole list, so redelivered tasks
/// converge on the same record.
///
/// ## Usage
///
/// ```rust,ignore
/// use imagepress::ledger::FjallStore;
///
/// let store = FjallStore::open("data/ledger")?;
/// store.replace_images("p1", &addresses)?;
/// let record = store.get("p1")?;
/// ```

pub mod error;
pub mod partitions;
pub mod store;

pub use error::{LedgerError, Result};
pub use store::{FjallStore, ImageRecord, StoreStats};
