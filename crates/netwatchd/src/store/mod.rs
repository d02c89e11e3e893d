//! Durable transition log.
//!
//! The log is an append-only map from [`Timestamp`] to [`ReachState`],
//! kept in a single table named `stateChanges`. Keys are ordered
//! numerically, so the last key is always the most recent transition.
//!
//! Two implementations share the [`TransitionStore`] trait:
//! - [`RedbStore`] - the on-disk log used by the daemon
//! - [`MemoryStore`] - an in-process map for tests and dry runs
//!
//! Every operation runs inside its own transaction, which is released
//! on every return path (the transaction guards are dropped).

mod history;
mod memory;
mod redb_store;

pub use history::{History, HISTORY_PAGE_SIZE};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use std::path::PathBuf;

use netwatch_core::{DomainError, ReachState, Timestamp, Transition};

/// Name of the table holding every transition record.
pub const STATE_CHANGES_TABLE: &str = "stateChanges";

/// Ordered, append-only storage of transitions.
///
/// Implementations must be safe to share between the sampler task
/// (the only writer) and any number of session tasks (readers).
pub trait TransitionStore: Send + Sync + 'static {
    /// Writes a record. Writing an existing key again replaces its
    /// state (last write wins) and is not an error.
    fn append(&self, transition: Transition) -> Result<(), StoreError>;

    /// Returns the state recorded at exactly `at`, if any.
    fn get(&self, at: Timestamp) -> Result<Option<ReachState>, StoreError>;

    /// Returns the highest-keyed record, or `None` on an empty log.
    fn latest(&self) -> Result<Option<Transition>, StoreError>;

    /// Returns up to `limit` records with keys strictly greater than
    /// `after` (or from the start when `after` is `None`), in key order.
    fn page_after(
        &self,
        after: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<Transition>, StoreError>;

    /// Lazily iterates over every record in key order.
    ///
    /// Records are fetched a page at a time; call again (or
    /// [`History::restart`]) to start over from the first key.
    fn all(&self) -> History<'_, Self>
    where
        Self: Sized,
    {
        History::new(self)
    }
}

/// Errors that can occur in transition log operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to create database directory {path}: {error}")]
    CreateDirectory { path: PathBuf, error: String },

    #[error("Failed to open database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("Failed to begin transaction: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Failed to open table stateChanges: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Failed to commit transaction: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Corrupt record at {at}: {source}")]
    Corrupt { at: Timestamp, source: DomainError },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Decodes a raw stored value into a transition.
fn decode_record(at: i64, value: &str) -> Result<Transition, StoreError> {
    let at = Timestamp::from_millis(at);
    ReachState::decode(value)
        .map(|state| Transition::new(at, state))
        .map_err(|source| StoreError::Corrupt { at, source })
}

/// Returns the first key to read for a page following `after`.
///
/// `None` means there can be nothing after `after`.
fn page_start(after: Option<Timestamp>) -> Option<i64> {
    match after {
        Some(ts) => ts.next().map(|next| next.as_millis()),
        None => Some(i64::MIN),
    }
}
