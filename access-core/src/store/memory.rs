//! In-memory storage backend
//!
//! Optimistic concurrency: a transaction works on a private copy of the
//! tables and, at commit, fails with [`StorageError::Conflict`] if any table it
//! wrote to was committed by someone else since it began. Commits are
//! therefore serializable per table and the store's retry loop re-runs the
//! whole unit of work.

use super::row::Row;
use super::storage::{RowSource, Storage, StorageError, StorageResult, Transaction};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
struct TableData {
    rows: BTreeMap<i64, Row>,
    /// Last generated key
    sequence: i64,
    /// Bumped on every commit that wrote to the table
    version: u64,
}

#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<HashMap<String, TableData>>,
    injected_conflicts: AtomicU32,
    commits: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with a transient conflict
    pub fn inject_conflicts(&self, n: u32) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    /// Successful commits so far
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("tables", &self.tables.lock().len())
            .field("commits", &self.commit_count())
            .finish()
    }
}

impl RowSource for MemoryStorage {
    fn scan(&self, table: &str) -> StorageResult<Vec<(i64, Row)>> {
        let tables = self.tables.lock();
        Ok(tables
            .get(table)
            .map(|t| t.rows.iter().map(|(k, r)| (*k, r.clone())).collect())
            .unwrap_or_default())
    }

    fn fetch(&self, table: &str, id: i64) -> StorageResult<Option<Row>> {
        let tables = self.tables.lock();
        Ok(tables.get(table).and_then(|t| t.rows.get(&id).cloned()))
    }
}

impl Storage for MemoryStorage {
    fn begin(&self) -> StorageResult<Box<dyn Transaction + '_>> {
        let snapshot = self.tables.lock().clone();
        Ok(Box::new(MemoryTransaction {
            storage: self,
            snapshot,
            written: HashSet::new(),
        }))
    }

    fn as_row_source(&self) -> &dyn RowSource {
        self
    }
}

struct MemoryTransaction<'a> {
    storage: &'a MemoryStorage,
    snapshot: HashMap<String, TableData>,
    written: HashSet<String>,
}

impl MemoryTransaction<'_> {
    fn table_mut(&mut self, table: &str) -> &mut TableData {
        self.written.insert(table.to_string());
        self.snapshot.entry(table.to_string()).or_default()
    }
}

impl RowSource for MemoryTransaction<'_> {
    fn scan(&self, table: &str) -> StorageResult<Vec<(i64, Row)>> {
        Ok(self
            .snapshot
            .get(table)
            .map(|t| t.rows.iter().map(|(k, r)| (*k, r.clone())).collect())
            .unwrap_or_default())
    }

    fn fetch(&self, table: &str, id: i64) -> StorageResult<Option<Row>> {
        Ok(self.snapshot.get(table).and_then(|t| t.rows.get(&id).cloned()))
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn insert(&mut self, table: &str, id_column: &str, mut row: Row) -> StorageResult<i64> {
        let data = self.table_mut(table);
        data.sequence += 1;
        let id = data.sequence;
        row.set(id_column, id);
        data.rows.insert(id, row);
        Ok(id)
    }

    fn update(&mut self, table: &str, id: i64, row: Row) -> StorageResult<bool> {
        let data = self.table_mut(table);
        match data.rows.get_mut(&id) {
            Some(existing) => {
                *existing = row;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&mut self, table: &str, id: i64) -> StorageResult<bool> {
        Ok(self.table_mut(table).rows.remove(&id).is_some())
    }

    fn lock_row(&mut self, table: &str, id: i64) -> StorageResult<bool> {
        // 加锁即视为写入，提交时参与冲突检测
        Ok(self.table_mut(table).rows.contains_key(&id))
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        let MemoryTransaction {
            storage,
            mut snapshot,
            written,
        } = *self;

        if storage.take_injected_conflict() {
            return Err(StorageError::Conflict("injected".to_string()));
        }

        let mut tables = storage.tables.lock();
        for name in &written {
            let base = snapshot.get(name).map(|t| t.version).unwrap_or(0);
            let current = tables.get(name).map(|t| t.version).unwrap_or(0);
            if base != current {
                tracing::debug!(table = %name, base, current, "Commit rejected, table changed");
                return Err(StorageError::Conflict(name.clone()));
            }
        }

        for name in written {
            if let Some(mut data) = snapshot.remove(&name) {
                data.version += 1;
                tables.insert(name, data);
            }
        }
        storage.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
