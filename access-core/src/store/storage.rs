//! Storage contract
//!
//! Backends only have to provide keyed row access ([`RowSource::scan`],
//! [`RowSource::fetch`]) and the write primitives of [`Transaction`]. Filtering,
//! sub-select resolution, sorting and paging run on top of that through the
//! provided methods, so every backend answers a [`ConditionSortLimit`] the same
//! way.

use super::row::Row;
use crate::query::eval::{compare_rows, matches};
use crate::query::{Condition, ConditionSortLimit};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another transaction committed to the same table first
    #[error("Write conflict on {0}")]
    Conflict(String),

    #[error("Row not found: table={0}, id={1}")]
    RowNotFound(String, i64),
}

impl StorageError {
    /// Whether retrying the whole transaction may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read access to tables
pub trait RowSource {
    /// Every row of `table` with its key, in key order. A missing table is empty.
    fn scan(&self, table: &str) -> StorageResult<Vec<(i64, Row)>>;

    fn fetch(&self, table: &str, id: i64) -> StorageResult<Option<Row>>;

    /// Rows matching `spec`
    fn select(&self, table: &str, spec: &ConditionSortLimit) -> StorageResult<Vec<Row>> {
        execute_select(self, table, spec)
    }

    /// Number of rows matching `condition`, ignoring sort and paging
    fn count(&self, table: &str, condition: &Condition) -> StorageResult<u64> {
        let resolved = resolve_sub_selects(self, condition)?;
        let n = self
            .scan(table)?
            .iter()
            .filter(|(_, row)| matches(&resolved, row))
            .count();
        Ok(n as u64)
    }
}

/// A unit of work. Dropping without [`Transaction::commit`] discards every write.
pub trait Transaction: RowSource {
    /// Insert `row` under a freshly generated key, written into `id_column`
    fn insert(&mut self, table: &str, id_column: &str, row: Row) -> StorageResult<i64>;

    /// Replace the row stored under `id`. `false` when there is none.
    fn update(&mut self, table: &str, id: i64, row: Row) -> StorageResult<bool>;

    fn delete(&mut self, table: &str, id: i64) -> StorageResult<bool>;

    /// Take a write lock on the row, `false` when it does not exist
    fn lock_row(&mut self, table: &str, id: i64) -> StorageResult<bool>;

    fn commit(self: Box<Self>) -> StorageResult<()>;

    fn delete_where(&mut self, table: &str, condition: &Condition) -> StorageResult<u64> {
        let resolved = resolve_sub_selects(self, condition)?;
        let keys: Vec<i64> = self
            .scan(table)?
            .into_iter()
            .filter(|(_, row)| matches(&resolved, row))
            .map(|(id, _)| id)
            .collect();

        let mut deleted = 0;
        for id in keys {
            if self.delete(table, id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

/// A shared storage backend
pub trait Storage: RowSource + Send + Sync {
    fn begin(&self) -> StorageResult<Box<dyn Transaction + '_>>;

    /// Read access outside of a transaction
    fn as_row_source(&self) -> &dyn RowSource;
}

/// Replace every `InSubSelect` with the `In` list it currently evaluates to
pub fn resolve_sub_selects<S: RowSource + ?Sized>(
    source: &S,
    condition: &Condition,
) -> StorageResult<Condition> {
    let resolved = match condition {
        Condition::InSubSelect {
            column,
            sub,
            negated,
        } => {
            let inner = resolve_sub_selects(source, &sub.condition)?;
            let values = source
                .scan(&sub.table)?
                .into_iter()
                .filter(|(_, row)| matches(&inner, row))
                .map(|(_, row)| row.get(&sub.select_column).clone())
                .filter(|v| !v.is_null())
                .collect();
            Condition::In {
                column: column.clone(),
                values,
                negated: *negated,
            }
        }
        Condition::And(members) => Condition::And(
            members
                .iter()
                .map(|c| resolve_sub_selects(source, c))
                .collect::<StorageResult<_>>()?,
        ),
        Condition::Or(members) => Condition::Or(
            members
                .iter()
                .map(|c| resolve_sub_selects(source, c))
                .collect::<StorageResult<_>>()?,
        ),
        Condition::Not(inner) => Condition::Not(Box::new(resolve_sub_selects(source, inner)?)),
        other => other.clone(),
    };
    Ok(resolved)
}

/// Filter, sort and page the rows of `table`
///
/// Ties in the sort keep key order, so paging is stable.
pub fn execute_select<S: RowSource + ?Sized>(
    source: &S,
    table: &str,
    spec: &ConditionSortLimit,
) -> StorageResult<Vec<Row>> {
    let condition = resolve_sub_selects(source, &spec.condition_or_true())?;
    let mut rows: Vec<Row> = source
        .scan(table)?
        .into_iter()
        .filter(|(_, row)| matches(&condition, row))
        .map(|(_, row)| row)
        .collect();

    if !spec.sort.is_empty() {
        rows.sort_by(|a, b| compare_rows(a, b, &spec.sort));
    }

    if let Some(page) = spec.page {
        rows = rows
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();
    }
    Ok(rows)
}
