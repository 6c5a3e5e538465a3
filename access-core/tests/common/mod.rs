//! Fixtures shared by the integration tests
//!
//! `MailingList` carries a read and an edit permission. Its recipients are
//! dependent rows in `mailing_list_recipients`, written and removed through
//! the relational hooks.

#![allow(dead_code)]

use access_core::config::StoreConfig;
use access_core::error::{CoreError, CoreResult};
use access_core::permission::{PermissionHolder, PermissionService};
use access_core::query::{Condition, ConditionSortLimit, SortField, Value};
use access_core::store::{
    DataType, Entity, EntityPolicy, EntityStore, EntityTable, MappingError, Row, RowSource,
    Storage, Transaction, bool_to_char, char_to_bool,
};
use parking_lot::Mutex;
use shared::error::ValidationResult;
use shared::models::{Permission, Role};
use std::sync::Arc;

pub const MAILING_LISTS: &str = "mailing_lists";
pub const RECIPIENTS: &str = "mailing_list_recipients";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailingList {
    pub id: Option<i64>,
    pub xid: String,
    pub name: String,
    pub receive_alarm_emails: bool,
    pub read_permission: Permission,
    pub edit_permission: Permission,
    pub recipients: Vec<String>,
}

impl MailingList {
    pub fn new(xid: &str, name: &str) -> Self {
        Self {
            id: None,
            xid: xid.to_string(),
            name: name.to_string(),
            receive_alarm_emails: false,
            read_permission: Permission::superadmin_only(),
            edit_permission: Permission::superadmin_only(),
            recipients: Vec::new(),
        }
    }

    pub fn with_recipients(mut self, recipients: &[&str]) -> Self {
        self.recipients = recipients.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn readable_by(mut self, permission: Permission) -> Self {
        self.read_permission = permission;
        self
    }

    pub fn editable_by(mut self, permission: Permission) -> Self {
        self.edit_permission = permission;
        self
    }
}

impl Entity for MailingList {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// What the store could see at each step of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteObservation {
    pub step: &'static str,
    pub primary_present: bool,
    pub dependents: u64,
}

type PreSaveHook = Arc<dyn Fn() + Send + Sync>;

pub struct MailingListPolicy {
    table: EntityTable,
    pre_save: Option<PreSaveHook>,
    pub deletes: Mutex<Vec<DeleteObservation>>,
}

impl Default for MailingListPolicy {
    fn default() -> Self {
        Self {
            table: EntityTable::new(MAILING_LISTS, "id")
                .insert_only_field("xid", "xid", DataType::Text)
                .field("name", "name", DataType::Text)
                .field("receiveAlarmEmails", "receive_alarm_emails", DataType::Char)
                .field("readPermission", "read_permission", DataType::Permission)
                .field("editPermission", "edit_permission", DataType::Permission),
            pre_save: None,
            deletes: Mutex::new(Vec::new()),
        }
    }
}

impl MailingListPolicy {
    /// Run `hook` at the start of every write, inside the transaction
    pub fn with_pre_save(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.pre_save = Some(Arc::new(hook));
        self
    }

    fn observe(&self, tx: &dyn Transaction, step: &'static str, id: i64) -> CoreResult<()> {
        let primary_present = tx.fetch(MAILING_LISTS, id)?.is_some();
        let dependents = tx.count(RECIPIENTS, &Condition::eq("mailing_list_id", id))?;
        self.deletes.lock().push(DeleteObservation {
            step,
            primary_present,
            dependents,
        });
        Ok(())
    }
}

fn decode_permission(row: &Row, column: &str) -> Result<Permission, MappingError> {
    Permission::decode(row.get_str(column).unwrap_or("[]"))
        .map_err(|e| MappingError::Invalid(format!("{}: {}", column, e)))
}

impl EntityPolicy for MailingListPolicy {
    type Entity = MailingList;

    fn table(&self) -> &EntityTable {
        &self.table
    }

    fn to_fields(&self, list: &MailingList) -> CoreResult<Vec<Value>> {
        Ok(vec![
            list.xid.clone().into(),
            list.name.clone().into(),
            bool_to_char(list.receive_alarm_emails),
            list.read_permission.encode()?.into(),
            list.edit_permission.encode()?.into(),
        ])
    }

    fn from_row(&self, row: &Row) -> Result<MailingList, MappingError> {
        Ok(MailingList {
            id: row.get_i64("id"),
            xid: row
                .get_str("xid")
                .ok_or_else(|| MappingError::Invalid("xid".into()))?
                .to_string(),
            name: row.get_str("name").unwrap_or_default().to_string(),
            receive_alarm_emails: char_to_bool(row.get("receive_alarm_emails")),
            read_permission: decode_permission(row, "read_permission")?,
            edit_permission: decode_permission(row, "edit_permission")?,
            recipients: Vec::new(),
        })
    }

    fn read_restriction(&self, holder: &dyn PermissionHolder) -> Option<Condition> {
        PermissionService::read_restriction(Some(holder), "read_permission")
    }

    fn save_pre_relational(
        &self,
        _tx: &mut dyn Transaction,
        _existing: Option<&MailingList>,
        _list: &MailingList,
    ) -> CoreResult<()> {
        if let Some(hook) = &self.pre_save {
            hook();
        }
        Ok(())
    }

    fn save_relational(
        &self,
        tx: &mut dyn Transaction,
        existing: Option<&MailingList>,
        list: &MailingList,
    ) -> CoreResult<()> {
        let id = list
            .id
            .ok_or_else(|| CoreError::Unexpected("mailing list without id".into()))?;
        if existing.is_some() {
            tx.delete_where(RECIPIENTS, &Condition::eq("mailing_list_id", id))?;
        }
        for address in &list.recipients {
            let row = Row::new()
                .with("mailing_list_id", id)
                .with("address", address.as_str());
            tx.insert(RECIPIENTS, "id", row)?;
        }
        Ok(())
    }

    fn delete_relational(&self, tx: &mut dyn Transaction, list: &MailingList) -> CoreResult<()> {
        let Some(id) = list.id else {
            return Ok(());
        };
        self.observe(tx, "before_dependents", id)?;
        tx.delete_where(RECIPIENTS, &Condition::eq("mailing_list_id", id))?;
        self.observe(tx, "after_dependents", id)
    }

    fn delete_post_relational(&self, tx: &mut dyn Transaction, list: &MailingList) -> CoreResult<()> {
        match list.id {
            Some(id) => self.observe(tx, "after_primary", id),
            None => Ok(()),
        }
    }

    fn load_relational(&self, source: &dyn RowSource, list: &mut MailingList) -> CoreResult<()> {
        let Some(id) = list.id else {
            return Ok(());
        };
        let spec = ConditionSortLimit::new(
            Some(Condition::eq("mailing_list_id", id)),
            vec![SortField::asc("id")],
            None,
        );
        list.recipients = source
            .select(RECIPIENTS, &spec)?
            .iter()
            .filter_map(|row| row.get_str("address").map(str::to_string))
            .collect();
        Ok(())
    }
}

pub fn store_with(
    policy: MailingListPolicy,
    storage: Arc<dyn Storage>,
    retries: u32,
) -> EntityStore<MailingListPolicy> {
    let config = StoreConfig::default().with_overrides(retries, false);
    EntityStore::new(policy, storage, &config)
}

/// Update guarded the way a permission-aware service does it: the holder
/// must satisfy the current edit permission, and permission changes are
/// checked field by field
pub fn update_checked(
    store: &EntityStore<MailingListPolicy>,
    permissions: &PermissionService,
    holder: &dyn PermissionHolder,
    existing: &MailingList,
    mut next: MailingList,
) -> CoreResult<MailingList> {
    permissions.ensure_permission(Some(holder), &existing.edit_permission)?;

    let mut result = ValidationResult::new();
    permissions.validate_permission(
        &mut result,
        "readPermission",
        Some(holder),
        Some(&existing.read_permission),
        &next.read_permission,
    );
    permissions.validate_permission(
        &mut result,
        "editPermission",
        Some(holder),
        Some(&existing.edit_permission),
        &next.edit_permission,
    );
    if !result.is_valid() {
        return Err(CoreError::Validation(result));
    }

    store.update(existing, &mut next)?;
    Ok(next)
}

pub fn role(id: i64, xid: &str) -> Role {
    Role::new(id, xid)
}
