//! Per-entity mapping and lifecycle hooks
//!
//! An [`EntityPolicy`] tells the generic [`EntityStore`](super::EntityStore)
//! how one entity type maps to rows and what else has to happen around its
//! writes. Only the mapping methods are required, every hook defaults to a
//! no-op.

use super::row::Row;
use super::storage::{RowSource, Transaction};
use super::table::EntityTable;
use crate::error::CoreResult;
use crate::permission::PermissionHolder;
use crate::query::{Condition, SubSelectMap, Value};
use thiserror::Error;

/// A stored entity with a storage-assigned key
pub trait Entity: Clone + Send + Sync + 'static {
    /// `None` until inserted
    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);
}

/// Row could not be turned into an entity
#[derive(Debug, Error)]
pub enum MappingError {
    /// Row references an implementation that is not installed
    #[error("Module not loaded: {0}")]
    ModuleNotLoaded(String),

    #[error("Invalid row: {0}")]
    Invalid(String),
}

pub trait EntityPolicy: Send + Sync + 'static {
    type Entity: Entity;

    fn table(&self) -> &EntityTable;

    /// Values of the mapped fields, in [`EntityTable::fields`] order
    ///
    /// Fails when a value cannot be encoded for storage.
    fn to_fields(&self, entity: &Self::Entity) -> CoreResult<Vec<Value>>;

    fn from_row(&self, row: &Row) -> Result<Self::Entity, MappingError>;

    /// Extra condition limiting what `holder` may read. `None` reads everything.
    fn read_restriction(&self, _holder: &dyn PermissionHolder) -> Option<Condition> {
        None
    }

    /// Query properties answered by a nested select
    fn sub_select_map(&self) -> SubSelectMap {
        SubSelectMap::new()
    }

    /// Before the main row is written. `existing` is `None` on insert.
    fn save_pre_relational(
        &self,
        _tx: &mut dyn Transaction,
        _existing: Option<&Self::Entity>,
        _entity: &Self::Entity,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// After the main row is written, `entity` carries its key
    fn save_relational(
        &self,
        _tx: &mut dyn Transaction,
        _existing: Option<&Self::Entity>,
        _entity: &Self::Entity,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// Before the main row is deleted
    fn delete_relational(&self, _tx: &mut dyn Transaction, _entity: &Self::Entity) -> CoreResult<()> {
        Ok(())
    }

    /// After the main row is deleted
    fn delete_post_relational(
        &self,
        _tx: &mut dyn Transaction,
        _entity: &Self::Entity,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// Fill dependent collections after the entity was mapped
    fn load_relational(&self, _source: &dyn RowSource, _entity: &mut Self::Entity) -> CoreResult<()> {
        Ok(())
    }
}
