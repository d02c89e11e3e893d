//! In-process transition log.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use netwatch_core::{ReachState, Timestamp, Transition};

use super::{page_start, StoreError, TransitionStore};

/// Transition log held in a `BTreeMap`.
///
/// Same ordering and overwrite semantics as [`super::RedbStore`], without
/// durability. Used by tests and anywhere a throwaway log is enough.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Timestamp, ReachState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `transitions`.
    pub fn with_transitions<I>(transitions: I) -> Self
    where
        I: IntoIterator<Item = Transition>,
    {
        let records = transitions.into_iter().map(|t| (t.at, t.state)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.read().map(|records| records.len()).unwrap_or(0)
    }

    /// Returns true if no records exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Timestamp, ReachState>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<Timestamp, ReachState>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl TransitionStore for MemoryStore {
    fn append(&self, transition: Transition) -> Result<(), StoreError> {
        self.write()?.insert(transition.at, transition.state);
        Ok(())
    }

    fn get(&self, at: Timestamp) -> Result<Option<ReachState>, StoreError> {
        Ok(self.read()?.get(&at).copied())
    }

    fn latest(&self) -> Result<Option<Transition>, StoreError> {
        Ok(self
            .read()?
            .iter()
            .next_back()
            .map(|(at, state)| Transition::new(*at, *state)))
    }

    fn page_after(
        &self,
        after: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<Transition>, StoreError> {
        let Some(start) = page_start(after) else {
            return Ok(Vec::new());
        };

        Ok(self
            .read()?
            .range(Timestamp::from_millis(start)..)
            .take(limit)
            .map(|(at, state)| Transition::new(*at, *state))
            .collect())
    }
}
