//! On-disk transition log backed by redb.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use netwatch_core::{ReachState, Timestamp, Transition};

use super::{decode_record, page_start, StoreError, TransitionStore};

/// Milliseconds since the epoch -> `"true"` / `"false"`.
const STATE_CHANGES: TableDefinition<i64, &str> = TableDefinition::new(super::STATE_CHANGES_TABLE);

/// Durable transition log stored in a single redb file.
///
/// redb serializes writers and gives readers snapshot isolation, so
/// the store needs no locking of its own.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl RedbStore {
    /// Opens (or creates) the log at `path`.
    ///
    /// Creates the parent directory and the `stateChanges` table if they
    /// do not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDirectory {
                    path: parent.to_path_buf(),
                    error: e.to_string(),
                })?;
            }
        }

        let db = Database::create(&path)?;

        let write_txn = db.begin_write()?;
        write_txn.open_table(STATE_CHANGES)?;
        write_txn.commit()?;

        info!(path = %path.display(), "Transition log opened");

        Ok(Self { db, path })
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TransitionStore for RedbStore {
    fn append(&self, transition: Transition) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(STATE_CHANGES)?;
            table.insert(transition.at.as_millis(), transition.state.encode())?;
        }
        write_txn.commit()?;

        debug!(
            at = %transition.at,
            state = %transition.state,
            "Transition appended"
        );
        Ok(())
    }

    fn get(&self, at: Timestamp) -> Result<Option<ReachState>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STATE_CHANGES)?;

        let state = match table.get(at.as_millis())? {
            Some(value) => decode_record(at.as_millis(), value.value()).map(|t| Some(t.state)),
            None => Ok(None),
        };
        state
    }

    fn latest(&self) -> Result<Option<Transition>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STATE_CHANGES)?;

        // Bound so the access guards drop before `table`
        let latest = match table.last()? {
            Some((key, value)) => decode_record(key.value(), value.value()).map(Some),
            None => Ok(None),
        };
        latest
    }

    fn page_after(
        &self,
        after: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<Transition>, StoreError> {
        let Some(start) = page_start(after) else {
            return Ok(Vec::new());
        };

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STATE_CHANGES)?;

        let mut page = Vec::new();
        for entry in table.range(start..)?.take(limit) {
            let (key, value) = entry?;
            page.push(decode_record(key.value(), value.value())?);
        }
        Ok(page)
    }
}
