//! Generic entity store
//!
//! [`EntityStore`] runs the create/read/update/delete lifecycle for any
//! entity described by an [`EntityPolicy`]:
//!
//! - writes run in a storage transaction together with the policy's
//!   relational hooks, retried as a whole on transient conflicts
//! - reads map rows through the policy, skipping rows that fail to map
//! - permission-aware reads AND the policy's read restriction into the query
//! - committed changes are published as [`DaoEvent`]s
//!
//! Events and counters are only touched once the commit succeeded, so a
//! retried write looks exactly like a single successful attempt.

use super::event::{DaoEvent, DaoEventType, EventPublisher};
use super::monitor::CountMonitor;
use super::policy::{Entity, EntityPolicy, MappingError};
use super::retry::RetryPolicy;
use super::row::Row;
use super::storage::{RowSource, Storage};
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::permission::PermissionHolder;
use crate::query::{
    AliasMap, Condition, ConditionSortLimit, QueryTranslator, SortField, SubSelectMap, Value,
    ValueConverterMap,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

pub struct EntityStore<P: EntityPolicy> {
    policy: Arc<P>,
    storage: Arc<dyn Storage>,
    translator: QueryTranslator,
    retry: RetryPolicy,
    events: EventPublisher<P::Entity>,
    count_monitor: Option<Arc<CountMonitor>>,
    use_metrics: bool,
    metrics_threshold_ms: u64,
}

impl<P: EntityPolicy> std::fmt::Debug for EntityStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("table", &self.policy.table().name())
            .field("translator", &self.translator)
            .field("retry", &self.retry)
            .field("use_metrics", &self.use_metrics)
            .finish_non_exhaustive()
    }
}

impl<P: EntityPolicy> EntityStore<P> {
    pub fn new(policy: P, storage: Arc<dyn Storage>, config: &StoreConfig) -> Self {
        let translator = policy.table().translator(policy.sub_select_map());
        let events = EventPublisher::new(policy.table().name(), config.event_channel_capacity);
        Self {
            policy: Arc::new(policy),
            storage,
            translator,
            retry: RetryPolicy::new(config.transaction_retries),
            events,
            count_monitor: None,
            use_metrics: config.use_metrics,
            metrics_threshold_ms: config.metrics_threshold_ms,
        }
    }

    /// Replace the retry policy, e.g. with a backend-specific classifier
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep a live row count, seeded from storage
    pub fn with_count_monitor(mut self) -> CoreResult<Self> {
        let initial = self.count()?;
        let name = format!("{}.count", self.policy.table().name());
        self.count_monitor = Some(Arc::new(CountMonitor::new(name, initial as i64)));
        Ok(self)
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn translator(&self) -> &QueryTranslator {
        &self.translator
    }

    pub fn count_monitor(&self) -> Option<&Arc<CountMonitor>> {
        self.count_monitor.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaoEvent<P::Entity>> {
        self.events.subscribe()
    }

    // ========== Writes ==========

    /// Insert `entity` and its dependents, assigning its key on success
    pub fn insert(&self, entity: &mut P::Entity) -> CoreResult<()> {
        let table = self.policy.table();
        let start = Instant::now();

        let inserted = self.retry.run(|attempt| {
            tracing::trace!(table = table.name(), attempt, "Insert attempt");
            let mut tx = self.storage.begin()?;
            self.policy.save_pre_relational(tx.as_mut(), None, entity)?;
            let row = self.to_row(entity)?;
            let id = tx.insert(table.name(), table.id_column(), row)?;

            let mut inserted = entity.clone();
            inserted.set_id(id);
            self.policy.save_relational(tx.as_mut(), None, &inserted)?;
            tx.commit()?;
            Ok(inserted)
        })?;

        *entity = inserted;
        if let Some(monitor) = &self.count_monitor {
            monitor.increment();
        }
        self.log_metrics("insert", start, 1);
        self.events.publish(DaoEventType::Create, entity.clone(), None);
        Ok(())
    }

    /// Write `entity` over `existing`
    ///
    /// The key is taken from `existing`, falling back to `entity`. Fields
    /// mapped as insert-only keep their stored value.
    pub fn update(&self, existing: &P::Entity, entity: &mut P::Entity) -> CoreResult<()> {
        let table = self.policy.table();
        let id = existing
            .id()
            .or_else(|| entity.id())
            .ok_or_else(|| CoreError::invalid_argument(format!("{} update without id", table.name())))?;
        let start = Instant::now();

        let updated = self.retry.run(|attempt| {
            tracing::trace!(table = table.name(), id, attempt, "Update attempt");
            let mut tx = self.storage.begin()?;
            let mut updated = entity.clone();
            updated.set_id(id);
            self.policy
                .save_pre_relational(tx.as_mut(), Some(existing), &updated)?;

            let mut row = tx
                .fetch(table.name(), id)?
                .ok_or_else(|| CoreError::NotFound(format!("{} id={}", table.name(), id)))?;
            let values = self.checked_fields(&updated)?;
            for (field, value) in table.fields().iter().zip(values) {
                if field.updatable {
                    row.set(field.column.clone(), value);
                }
            }
            tx.update(table.name(), id, row)?;

            self.policy
                .save_relational(tx.as_mut(), Some(existing), &updated)?;
            tx.commit()?;
            Ok(updated)
        })?;

        *entity = updated;
        self.log_metrics("update", start, 1);
        self.events
            .publish(DaoEventType::Update, entity.clone(), Some(existing.clone()));
        Ok(())
    }

    /// Update the stored entity with key `id`, returning its previous state
    pub fn update_by_id(&self, id: i64, entity: &mut P::Entity) -> CoreResult<P::Entity> {
        let existing = self.get(id)?.ok_or_else(|| {
            CoreError::NotFound(format!("{} id={}", self.policy.table().name(), id))
        })?;
        self.update(&existing, entity)?;
        Ok(existing)
    }

    /// Delete `entity` and its dependents
    ///
    /// The row is locked first. `false`, with no event, when it was already
    /// gone.
    pub fn delete(&self, entity: &P::Entity) -> CoreResult<bool> {
        let table = self.policy.table();
        let Some(id) = entity.id() else {
            return Ok(false);
        };
        let start = Instant::now();

        let deleted = self.retry.run(|attempt| {
            tracing::trace!(table = table.name(), id, attempt, "Delete attempt");
            let mut tx = self.storage.begin()?;
            if !tx.lock_row(table.name(), id)? {
                return Ok(false);
            }
            self.policy.delete_relational(tx.as_mut(), entity)?;
            let deleted = tx.delete(table.name(), id)?;
            if deleted {
                self.policy.delete_post_relational(tx.as_mut(), entity)?;
            }
            tx.commit()?;
            Ok(deleted)
        })?;

        if deleted {
            if let Some(monitor) = &self.count_monitor {
                monitor.decrement();
            }
            self.log_metrics("delete", start, 1);
            self.events.publish(DaoEventType::Delete, entity.clone(), None);
        }
        Ok(deleted)
    }

    pub fn delete_by_id(&self, id: i64) -> CoreResult<bool> {
        match self.get(id)? {
            Some(entity) => self.delete(&entity),
            None => Ok(false),
        }
    }

    // ========== Reads ==========

    pub fn get(&self, id: i64) -> CoreResult<Option<P::Entity>> {
        let table = self.policy.table();
        let row = self.storage.fetch(table.name(), id)?;
        match row {
            Some(row) => self.map_row(self.storage.as_row_source(), &row),
            None => Ok(None),
        }
    }

    /// Every entity in key order, without permission filtering
    pub fn get_all(&self) -> CoreResult<Vec<P::Entity>> {
        let spec = ConditionSortLimit::with_null_limit_offset(
            None,
            vec![SortField::asc(self.policy.table().id_column())],
        );
        self.select(&spec, "get_all")
    }

    /// Entities matching the condition, without permission filtering
    pub fn query_all(&self, spec: &ConditionSortLimit) -> CoreResult<Vec<P::Entity>> {
        self.select(spec, "query_all")
    }

    /// Every entity `holder` may read
    pub fn list(&self, holder: &dyn PermissionHolder) -> CoreResult<Vec<P::Entity>> {
        self.customized_query(holder, &ConditionSortLimit::all())
    }

    /// Entities matching `rql` that `holder` may read
    pub fn query(&self, holder: &dyn PermissionHolder, rql: &str) -> CoreResult<Vec<P::Entity>> {
        let spec = self.rql_to_condition(rql)?;
        self.customized_query(holder, &spec)
    }

    /// Like [`EntityStore::query`] with extra property mappings for this call
    pub fn query_with(
        &self,
        holder: &dyn PermissionHolder,
        rql: &str,
        alias_map: AliasMap,
        sub_select_map: SubSelectMap,
        value_converters: ValueConverterMap,
    ) -> CoreResult<Vec<P::Entity>> {
        let spec = self.rql_to_condition_with(rql, alias_map, sub_select_map, value_converters)?;
        self.customized_query(holder, &spec)
    }

    /// Entities matching `spec` that `holder` may read
    pub fn customized_query(
        &self,
        holder: &dyn PermissionHolder,
        spec: &ConditionSortLimit,
    ) -> CoreResult<Vec<P::Entity>> {
        let spec = self.restrict(holder, spec.clone());
        self.select(&spec, "customized_query")
    }

    /// Rows in the table, without permission filtering
    pub fn count(&self) -> CoreResult<u64> {
        Ok(self
            .storage
            .count(self.policy.table().name(), &Condition::True)?)
    }

    /// Rows `holder` may read
    pub fn count_for(&self, holder: &dyn PermissionHolder) -> CoreResult<u64> {
        self.customized_count(holder, &Condition::True)
    }

    pub fn count_query(&self, holder: &dyn PermissionHolder, rql: &str) -> CoreResult<u64> {
        let spec = self.rql_to_condition(rql)?;
        self.customized_count(holder, &spec.condition_or_true())
    }

    /// Rows matching `condition` that `holder` may read, paging ignored
    pub fn customized_count(
        &self,
        holder: &dyn PermissionHolder,
        condition: &Condition,
    ) -> CoreResult<u64> {
        let start = Instant::now();
        let spec = self.restrict(holder, ConditionSortLimit::from_condition(condition.clone()));
        let n = self
            .storage
            .count(self.policy.table().name(), &spec.condition_or_true())?;
        self.log_metrics("customized_count", start, n as usize);
        Ok(n)
    }

    pub fn rql_to_condition(&self, rql: &str) -> CoreResult<ConditionSortLimit> {
        self.translator.translate_query(rql)
    }

    /// Translate with per-call mappings layered over the table's own
    pub fn rql_to_condition_with(
        &self,
        rql: &str,
        alias_map: AliasMap,
        sub_select_map: SubSelectMap,
        value_converters: ValueConverterMap,
    ) -> CoreResult<ConditionSortLimit> {
        self.translator
            .extend(alias_map, sub_select_map, value_converters)
            .translate_query(rql)
    }

    // ========== Internals ==========

    fn restrict(&self, holder: &dyn PermissionHolder, spec: ConditionSortLimit) -> ConditionSortLimit {
        match self.policy.read_restriction(holder) {
            Some(restriction) => spec.restrict(restriction),
            None => spec,
        }
    }

    fn select(&self, spec: &ConditionSortLimit, operation: &str) -> CoreResult<Vec<P::Entity>> {
        let start = Instant::now();
        let rows = self.storage.select(self.policy.table().name(), spec)?;
        let source = self.storage.as_row_source();
        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(entity) = self.map_row(source, row)? {
                entities.push(entity);
            }
        }
        self.log_metrics(operation, start, entities.len());
        Ok(entities)
    }

    /// `None` for rows that cannot be mapped, after logging why
    fn map_row(&self, source: &dyn RowSource, row: &Row) -> CoreResult<Option<P::Entity>> {
        let table = self.policy.table().name();
        let mut entity = match self.policy.from_row(row) {
            Ok(entity) => entity,
            Err(MappingError::ModuleNotLoaded(module)) => {
                tracing::warn!(table, module = %module, id = ?row.get_i64(self.policy.table().id_column()), "Skipping row, module not loaded");
                return Ok(None);
            }
            Err(e) => {
                tracing::error!(table, error = %e, id = ?row.get_i64(self.policy.table().id_column()), "Skipping row that failed to map");
                return Ok(None);
            }
        };
        self.policy.load_relational(source, &mut entity)?;
        Ok(Some(entity))
    }

    fn checked_fields(&self, entity: &P::Entity) -> CoreResult<Vec<Value>> {
        let table = self.policy.table();
        let values = self.policy.to_fields(entity)?;
        if values.len() != table.fields().len() {
            return Err(CoreError::Unexpected(format!(
                "{} maps {} fields but got {} values",
                table.name(),
                table.fields().len(),
                values.len()
            )));
        }
        Ok(values)
    }

    fn to_row(&self, entity: &P::Entity) -> CoreResult<Row> {
        let table = self.policy.table();
        let values = self.checked_fields(entity)?;
        let mut row: Row = table
            .fields()
            .iter()
            .map(|f| f.column.clone())
            .zip(values)
            .collect();
        if let Some(id) = entity.id() {
            row.set(table.id_column(), id);
        }
        Ok(row)
    }

    fn log_metrics(&self, operation: &str, start: Instant, rows: usize) {
        if !self.use_metrics {
            return;
        }
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if elapsed_ms >= self.metrics_threshold_ms {
            tracing::info!(
                table = self.policy.table().name(),
                operation,
                elapsed_ms,
                rows,
                "Store operation timing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Actor;
    use crate::store::memory::MemoryStorage;
    use crate::store::StorageError;
    use crate::store::table::{DataType, EntityTable};

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: Option<i64>,
        xid: String,
        body: String,
    }

    impl Entity for Note {
        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    struct NotePolicy {
        table: EntityTable,
    }

    impl NotePolicy {
        fn new() -> Self {
            Self {
                table: EntityTable::new("notes", "id")
                    .insert_only_field("xid", "xid", DataType::Text)
                    .field("body", "body", DataType::Text),
            }
        }
    }

    impl EntityPolicy for NotePolicy {
        type Entity = Note;

        fn table(&self) -> &EntityTable {
            &self.table
        }

        fn to_fields(&self, note: &Note) -> CoreResult<Vec<Value>> {
            Ok(vec![note.xid.clone().into(), note.body.clone().into()])
        }

        fn from_row(&self, row: &Row) -> Result<Note, MappingError> {
            let body = row.get_str("body").unwrap_or_default();
            if body == "plugin" {
                return Err(MappingError::ModuleNotLoaded("plugin".into()));
            }
            Ok(Note {
                id: row.get_i64("id"),
                xid: row
                    .get_str("xid")
                    .ok_or_else(|| MappingError::Invalid("xid".into()))?
                    .to_string(),
                body: body.to_string(),
            })
        }
    }

    fn note(xid: &str, body: &str) -> Note {
        Note {
            id: None,
            xid: xid.into(),
            body: body.into(),
        }
    }

    fn store() -> EntityStore<NotePolicy> {
        EntityStore::new(
            NotePolicy::new(),
            Arc::new(MemoryStorage::new()),
            &StoreConfig::default(),
        )
    }

    #[test]
    fn test_insert_get_update() {
        let store = store();
        let mut n = note("n1", "hello");
        store.insert(&mut n).unwrap();
        assert_eq!(n.id, Some(1));
        assert_eq!(store.get(1).unwrap(), Some(n.clone()));

        let mut changed = Note {
            xid: "renamed".into(),
            body: "bye".into(),
            ..n.clone()
        };
        let previous = store.update_by_id(1, &mut changed).unwrap();
        assert_eq!(previous.body, "hello");

        let stored = store.get(1).unwrap().unwrap();
        assert_eq!(stored.body, "bye");
        // insert-only
        assert_eq!(stored.xid, "n1");
    }

    #[test]
    fn test_unmappable_rows_are_skipped() {
        let store = store();
        store.insert(&mut note("a", "one")).unwrap();
        store.insert(&mut note("b", "plugin")).unwrap();
        store.insert(&mut note("c", "three")).unwrap();

        let all = store.get_all().unwrap();
        let xids: Vec<_> = all.iter().map(|n| n.xid.as_str()).collect();
        assert_eq!(xids, vec!["a", "c"]);
        assert_eq!(store.get(2).unwrap(), None);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_query_and_count() {
        let store = store();
        for (xid, body) in [("a", "x"), ("b", "y"), ("c", "x")] {
            store.insert(&mut note(xid, body)).unwrap();
        }
        let actor = Actor::new("reader", []);
        let found = store.query(&actor, "body=x&sort(-xid)").unwrap();
        let xids: Vec<_> = found.iter().map(|n| n.xid.as_str()).collect();
        assert_eq!(xids, vec!["c", "a"]);
        assert_eq!(store.count_query(&actor, "body=x&limit(1)").unwrap(), 2);
        assert!(matches!(
            store.query(&actor, "foo=bar"),
            Err(CoreError::FieldNotFound(p)) if p == "foo"
        ));
    }

    #[test]
    fn test_delete_missing_is_false() {
        let store = store();
        let mut rx = store.subscribe();
        assert!(!store.delete_by_id(7).unwrap());
        assert!(!store.delete(&note("ghost", "")).unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_count_monitor_tracks_writes() {
        let store = store();
        store.insert(&mut note("a", "x")).unwrap();
        let store = store.with_count_monitor().unwrap();
        let mut b = note("b", "y");
        store.insert(&mut b).unwrap();
        assert_eq!(store.count_monitor().unwrap().get(), 2);
        store.delete(&b).unwrap();
        assert_eq!(store.count_monitor().unwrap().get(), 1);
    }

    #[test]
    fn test_field_count_mismatch_is_rejected() {
        struct Broken(EntityTable);
        impl EntityPolicy for Broken {
            type Entity = Note;
            fn table(&self) -> &EntityTable {
                &self.0
            }
            fn to_fields(&self, note: &Note) -> CoreResult<Vec<Value>> {
                Ok(vec![note.xid.clone().into()])
            }
            fn from_row(&self, _row: &Row) -> Result<Note, MappingError> {
                Err(MappingError::Invalid("unused".into()))
            }
        }
        let store = EntityStore::new(
            Broken(NotePolicy::new().table),
            Arc::new(MemoryStorage::new()),
            &StoreConfig::default(),
        );
        assert!(matches!(
            store.insert(&mut note("a", "b")),
            Err(CoreError::Unexpected(_))
        ));
    }

    #[test]
    fn test_unencodable_fields_abort_the_write() {
        struct Unencodable(EntityTable);
        impl EntityPolicy for Unencodable {
            type Entity = Note;
            fn table(&self) -> &EntityTable {
                &self.0
            }
            fn to_fields(&self, _note: &Note) -> CoreResult<Vec<Value>> {
                let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
                Err(err.into())
            }
            fn from_row(&self, _row: &Row) -> Result<Note, MappingError> {
                Err(MappingError::Invalid("unused".into()))
            }
        }
        let storage = Arc::new(MemoryStorage::new());
        let store = EntityStore::new(
            Unencodable(NotePolicy::new().table),
            storage.clone(),
            &StoreConfig::default(),
        );
        let err = store.insert(&mut note("a", "b")).unwrap_err();
        assert!(matches!(err, CoreError::Storage(StorageError::Serialization(_))), "{err:?}");
        assert!(!err.is_transient());
        assert_eq!(storage.count("notes", &Condition::True).unwrap(), 0);
    }
}
