//! redb storage backend
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `<entity table>` | `id` | `Row` (JSON) | One redb table per logical table |
//! | `__sequences` | table name | `i64` | Last generated key per table |
//!
//! redb allows a single write transaction at a time, so writers are
//! serialized and never see [`StorageError::Conflict`]. Readers work on a
//! consistent snapshot and are never blocked.

use super::row::Row;
use super::storage::{RowSource, Storage, StorageResult, Transaction};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use std::path::Path;
use std::sync::Arc;

/// Key generator per table
const SEQUENCE_TABLE: TableDefinition<&str, i64> = TableDefinition::new("__sequences");

/// Row table: key = id, value = JSON-serialized Row
fn rows_table(name: &str) -> TableDefinition<'_, i64, &'static [u8]> {
    TableDefinition::new(name)
}

fn collect_rows<T>(table: &T) -> StorageResult<Vec<(i64, Row)>>
where
    T: ReadableTable<i64, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        rows.push((key.value(), serde_json::from_slice(value.value())?));
    }
    Ok(rows)
}

fn fetch_row<T>(table: &T, id: i64) -> StorageResult<Option<Row>>
where
    T: ReadableTable<i64, &'static [u8]>,
{
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Row storage backed by redb
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SEQUENCE_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// In-memory database, nothing touches the disk
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SEQUENCE_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage").finish_non_exhaustive()
    }
}

impl RowSource for RedbStorage {
    fn scan(&self, table: &str) -> StorageResult<Vec<(i64, Row)>> {
        let read_txn = self.db.begin_read()?;
        match read_txn.open_table(rows_table(table)) {
            Ok(t) => collect_rows(&t),
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch(&self, table: &str, id: i64) -> StorageResult<Option<Row>> {
        let read_txn = self.db.begin_read()?;
        match read_txn.open_table(rows_table(table)) {
            Ok(t) => fetch_row(&t, id),
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Storage for RedbStorage {
    fn begin(&self) -> StorageResult<Box<dyn Transaction + '_>> {
        let txn = self.db.begin_write()?;
        Ok(Box::new(RedbTransaction { txn }))
    }

    fn as_row_source(&self) -> &dyn RowSource {
        self
    }
}

struct RedbTransaction {
    txn: WriteTransaction,
}

impl RowSource for RedbTransaction {
    fn scan(&self, table: &str) -> StorageResult<Vec<(i64, Row)>> {
        let t = self.txn.open_table(rows_table(table))?;
        collect_rows(&t)
    }

    fn fetch(&self, table: &str, id: i64) -> StorageResult<Option<Row>> {
        let t = self.txn.open_table(rows_table(table))?;
        fetch_row(&t, id)
    }
}

impl Transaction for RedbTransaction {
    fn insert(&mut self, table: &str, id_column: &str, mut row: Row) -> StorageResult<i64> {
        let id = {
            let mut seq = self.txn.open_table(SEQUENCE_TABLE)?;
            let current = seq.get(table)?.map(|v| v.value()).unwrap_or(0);
            let next = current + 1;
            seq.insert(table, next)?;
            next
        };

        row.set(id_column, id);
        let bytes = serde_json::to_vec(&row)?;
        let mut t = self.txn.open_table(rows_table(table))?;
        t.insert(id, bytes.as_slice())?;
        Ok(id)
    }

    fn update(&mut self, table: &str, id: i64, row: Row) -> StorageResult<bool> {
        let mut t = self.txn.open_table(rows_table(table))?;
        if t.get(id)?.is_none() {
            return Ok(false);
        }
        let bytes = serde_json::to_vec(&row)?;
        t.insert(id, bytes.as_slice())?;
        Ok(true)
    }

    fn delete(&mut self, table: &str, id: i64) -> StorageResult<bool> {
        let mut t = self.txn.open_table(rows_table(table))?;
        let removed = t.remove(id)?.is_some();
        Ok(removed)
    }

    fn lock_row(&mut self, table: &str, id: i64) -> StorageResult<bool> {
        // 单写事务，存在即持有锁
        let t = self.txn.open_table(rows_table(table))?;
        let exists = t.get(id)?.is_some();
        Ok(exists)
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        self.txn.commit()?;
        Ok(())
    }
}
