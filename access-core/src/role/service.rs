//! Role administration
//!
//! Roles are stored through the generic [`EntityStore`]: the `roles` table
//! holds xid and name, inheritance edges are dependent rows in
//! `role_inheritance`. Every change rebuilds the shared [`RoleGraph`].
//!
//! Only superadmins may change roles. The bootstrap roles `superadmin` and
//! `user` can neither be recreated, edited nor deleted.
//!
//! System permissions (`system_permissions`) are the named permissions that
//! guard platform features. Deleting a role strips it from them, and from any
//! other permission column registered on the [`RolePolicy`].

use super::graph::RoleGraph;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::permission::{PermissionHolder, PermissionService, system_superadmin};
use crate::query::{Condition, ConditionSortLimit, Value};
use crate::store::{
    DataType, Entity, EntityPolicy, EntityStore, EntityTable, MappingError, Row, RowSource,
    Storage, Transaction,
};
use shared::error::ValidationResult;
use shared::models::role::{SUPERADMIN_ROLE_XID, USER_ROLE_XID};
use shared::models::{Permission, Role, RoleVo};
use std::sync::Arc;

pub const ROLES_TABLE: &str = "roles";
pub const ROLE_INHERITANCE_TABLE: &str = "role_inheritance";
pub const SYSTEM_PERMISSIONS_TABLE: &str = "system_permissions";

impl Entity for RoleVo {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// A column holding an encoded [`Permission`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionColumn {
    pub table: String,
    pub column: String,
}

impl PermissionColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

pub struct RolePolicy {
    table: EntityTable,
    permission_columns: Vec<PermissionColumn>,
}

impl RolePolicy {
    /// `permission_columns` are cleaned of a role when it is deleted, on top
    /// of the system permissions
    pub fn new(permission_columns: Vec<PermissionColumn>) -> Self {
        let mut columns = vec![PermissionColumn::new(SYSTEM_PERMISSIONS_TABLE, "permission")];
        columns.extend(permission_columns);
        Self {
            table: EntityTable::new(ROLES_TABLE, "id")
                .insert_only_field("xid", "xid", DataType::Text)
                .field("name", "name", DataType::Text),
            permission_columns: columns,
        }
    }

    fn strip_from_permissions(&self, tx: &mut dyn Transaction, role: &Role) -> CoreResult<()> {
        for target in &self.permission_columns {
            for (key, mut row) in tx.scan(&target.table)? {
                let Some(raw) = row.get_str(&target.column) else {
                    continue;
                };
                let permission = match Permission::decode(raw) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(table = %target.table, id = key, error = %e, "Unreadable permission column");
                        continue;
                    }
                };
                if permission.contains_role(role) {
                    row.set(target.column.clone(), permission.without_role(role).encode()?);
                    tx.update(&target.table, key, row)?;
                }
            }
        }
        Ok(())
    }
}

impl EntityPolicy for RolePolicy {
    type Entity = RoleVo;

    fn table(&self) -> &EntityTable {
        &self.table
    }

    fn to_fields(&self, vo: &RoleVo) -> CoreResult<Vec<Value>> {
        Ok(vec![vo.xid.clone().into(), vo.name.clone().into()])
    }

    fn from_row(&self, row: &Row) -> Result<RoleVo, MappingError> {
        let xid = row
            .get_str("xid")
            .ok_or_else(|| MappingError::Invalid("role without xid".into()))?;
        let mut vo = RoleVo::new(xid, row.get_str("name").unwrap_or_default());
        vo.id = row.get_i64("id");
        Ok(vo)
    }

    fn save_relational(
        &self,
        tx: &mut dyn Transaction,
        existing: Option<&RoleVo>,
        vo: &RoleVo,
    ) -> CoreResult<()> {
        let id = vo
            .id
            .ok_or_else(|| CoreError::Unexpected("role saved without id".into()))?;
        if existing.is_some() {
            tx.delete_where(ROLE_INHERITANCE_TABLE, &Condition::eq("role_id", id))?;
        }
        for parent in &vo.inherited {
            let row = Row::new()
                .with("role_id", id)
                .with("inherited_role_id", parent.id);
            tx.insert(ROLE_INHERITANCE_TABLE, "id", row)?;
        }
        Ok(())
    }

    fn delete_relational(&self, tx: &mut dyn Transaction, vo: &RoleVo) -> CoreResult<()> {
        let Some(role) = vo.role() else {
            return Ok(());
        };
        let edges = Condition::or_all([
            Condition::eq("role_id", role.id),
            Condition::eq("inherited_role_id", role.id),
        ]);
        tx.delete_where(ROLE_INHERITANCE_TABLE, &edges)?;
        self.strip_from_permissions(tx, &role)
    }

    fn load_relational(&self, source: &dyn RowSource, vo: &mut RoleVo) -> CoreResult<()> {
        let Some(id) = vo.id else {
            return Ok(());
        };
        let edges = source.select(
            ROLE_INHERITANCE_TABLE,
            &ConditionSortLimit::from_condition(Condition::eq("role_id", id)),
        )?;
        for edge in edges {
            let Some(parent_id) = edge.get_i64("inherited_role_id") else {
                continue;
            };
            match source.fetch(ROLES_TABLE, parent_id)? {
                Some(parent) => {
                    if let Some(xid) = parent.get_str("xid") {
                        vo.inherited.insert(Role::new(parent_id, xid));
                    }
                }
                None => tracing::warn!(role = %vo.xid, parent_id, "Inheritance edge to missing role"),
            }
        }
        Ok(())
    }
}

/// A named platform permission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPermission {
    pub id: Option<i64>,
    pub permission_type: String,
    pub permission: Permission,
}

impl Entity for SystemPermission {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

pub struct SystemPermissionPolicy {
    table: EntityTable,
}

impl Default for SystemPermissionPolicy {
    fn default() -> Self {
        Self {
            table: EntityTable::new(SYSTEM_PERMISSIONS_TABLE, "id")
                .insert_only_field("permissionType", "permission_type", DataType::Text)
                .field("permission", "permission", DataType::Permission),
        }
    }
}

impl EntityPolicy for SystemPermissionPolicy {
    type Entity = SystemPermission;

    fn table(&self) -> &EntityTable {
        &self.table
    }

    fn to_fields(&self, p: &SystemPermission) -> CoreResult<Vec<Value>> {
        Ok(vec![p.permission_type.clone().into(), p.permission.encode()?.into()])
    }

    fn from_row(&self, row: &Row) -> Result<SystemPermission, MappingError> {
        let permission_type = row
            .get_str("permission_type")
            .ok_or_else(|| MappingError::Invalid("missing permission_type".into()))?;
        let permission = Permission::decode(row.get_str("permission").unwrap_or("[]"))
            .map_err(|e| MappingError::Invalid(e.to_string()))?;
        Ok(SystemPermission {
            id: row.get_i64("id"),
            permission_type: permission_type.to_string(),
            permission,
        })
    }
}

/// Message for an attempt to change a bootstrap role
///
/// Reserved xids match regardless of case, `SuperAdmin` is still reserved.
fn reserved_role_message(xid: &str) -> Option<&'static str> {
    let xid = xid.trim();
    if xid.eq_ignore_ascii_case(SUPERADMIN_ROLE_XID) {
        Some("roles.cannotAlterSuperadminRole")
    } else if xid.eq_ignore_ascii_case(USER_ROLE_XID) {
        Some("roles.cannotAlterUserRole")
    } else {
        None
    }
}

pub struct RoleService {
    roles: EntityStore<RolePolicy>,
    system_permissions: EntityStore<SystemPermissionPolicy>,
    graph: Arc<RoleGraph>,
    permission_service: PermissionService,
}

impl std::fmt::Debug for RoleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleService")
            .field("roles", &self.roles)
            .field("graph", &self.graph.snapshot().len())
            .finish_non_exhaustive()
    }
}

impl RoleService {
    /// Open the role tables, creating the bootstrap roles on first use, and
    /// load the graph from them
    pub fn new(
        storage: Arc<dyn Storage>,
        graph: Arc<RoleGraph>,
        config: &StoreConfig,
        permission_columns: Vec<PermissionColumn>,
    ) -> CoreResult<Self> {
        let roles = EntityStore::new(RolePolicy::new(permission_columns), Arc::clone(&storage), config);
        let system_permissions =
            EntityStore::new(SystemPermissionPolicy::default(), storage, config);
        let service = Self {
            roles,
            system_permissions,
            permission_service: PermissionService::new(Arc::clone(&graph)),
            graph,
        };

        if service.roles.count()? == 0 {
            for role in [Role::superadmin(), Role::user()] {
                let mut vo = RoleVo::new(role.xid.clone(), role.xid.clone());
                service.roles.insert(&mut vo)?;
                if vo.id != Some(role.id) {
                    tracing::warn!(xid = %role.xid, expected = role.id, actual = ?vo.id, "Bootstrap role stored under unexpected id");
                }
            }
            tracing::info!("Bootstrap roles created");
        }
        service.reload()?;
        Ok(service)
    }

    pub fn graph(&self) -> &Arc<RoleGraph> {
        &self.graph
    }

    pub fn permission_service(&self) -> &PermissionService {
        &self.permission_service
    }

    pub fn store(&self) -> &EntityStore<RolePolicy> {
        &self.roles
    }

    /// Rebuild the role graph from storage
    pub fn reload(&self) -> CoreResult<()> {
        let all = self.roles.get_all()?;
        self.graph.replace_all(&all);
        Ok(())
    }

    pub fn superadmin_role(&self) -> Role {
        self.graph.get(SUPERADMIN_ROLE_XID).unwrap_or_else(Role::superadmin)
    }

    pub fn user_role(&self) -> Role {
        self.graph.get(USER_ROLE_XID).unwrap_or_else(Role::user)
    }

    fn find(&self, xid: &str) -> CoreResult<Option<RoleVo>> {
        let spec = ConditionSortLimit::from_condition(Condition::eq("xid", xid));
        Ok(self.roles.query_all(&spec)?.into_iter().next())
    }

    /// Role by xid, NotFound when missing
    pub fn get(&self, xid: &str) -> CoreResult<RoleVo> {
        self.find(xid)?
            .ok_or_else(|| CoreError::NotFound(format!("role {}", xid)))
    }

    pub fn list(&self, holder: Option<&dyn PermissionHolder>) -> CoreResult<Vec<RoleVo>> {
        let holder = self.permission_service.ensure_valid_permission_holder(holder)?;
        self.roles.list(holder)
    }

    pub fn query(&self, holder: Option<&dyn PermissionHolder>, rql: &str) -> CoreResult<Vec<RoleVo>> {
        let holder = self.permission_service.ensure_valid_permission_holder(holder)?;
        self.roles.query(holder, rql)
    }

    fn validate(&self, existing: Option<&RoleVo>, vo: &RoleVo) -> CoreResult<()> {
        let mut result = ValidationResult::new();

        if vo.xid.trim().is_empty() {
            result.add_contextual_message("xid", "validate.required");
        } else if vo.xid.chars().any(char::is_whitespace) {
            result.add_contextual_message("xid", "validate.role.noSpaceAllowed");
        }

        match existing {
            None => {
                if let Some(message) = reserved_role_message(&vo.xid) {
                    result.add_contextual_message("xid", message);
                } else if !vo.xid.trim().is_empty() && self.find(&vo.xid)?.is_some() {
                    result.add_contextual_message("xid", "validate.xidUsed");
                }
            }
            Some(old) => {
                if let Some(message) = reserved_role_message(&old.xid) {
                    result.add_contextual_message("xid", message);
                } else if old.xid != vo.xid {
                    result.add_contextual_message("xid", "validate.role.cannotChangeXid");
                }
            }
        }

        if vo.name.trim().is_empty() {
            result.add_contextual_message("name", "validate.required");
        }

        let graph = self.graph.snapshot();
        for parent in &vo.inherited {
            if parent.xid == vo.xid {
                result.add_contextual_message("inherited", "validate.role.inheritSelf");
            } else if !graph.contains(parent) {
                result.add_contextual_message_with_args(
                    "inherited",
                    "validate.role.notFound",
                    [parent.xid.clone()],
                );
            }
        }

        if result.is_valid() {
            Ok(())
        } else {
            Err(CoreError::Validation(result))
        }
    }

    pub fn insert(&self, holder: Option<&dyn PermissionHolder>, mut vo: RoleVo) -> CoreResult<RoleVo> {
        self.permission_service.ensure_admin_role(holder)?;
        vo.id = None;
        self.validate(None, &vo)?;
        self.roles.insert(&mut vo)?;
        self.reload()?;
        tracing::info!(xid = %vo.xid, "Role created");
        Ok(vo)
    }

    pub fn update(&self, holder: Option<&dyn PermissionHolder>, xid: &str, mut vo: RoleVo) -> CoreResult<RoleVo> {
        self.permission_service.ensure_admin_role(holder)?;
        let existing = self.get(xid)?;
        vo.id = existing.id;
        self.validate(Some(&existing), &vo)?;
        self.roles.update(&existing, &mut vo)?;
        self.reload()?;
        tracing::info!(xid = %vo.xid, "Role updated");
        Ok(vo)
    }

    /// Delete a role, its inheritance edges and its uses in permissions
    pub fn delete(&self, holder: Option<&dyn PermissionHolder>, xid: &str) -> CoreResult<RoleVo> {
        self.permission_service.ensure_admin_role(holder)?;
        if let Some(message) = reserved_role_message(xid) {
            return Err(CoreError::permission_denied(
                holder.map(|h| h.permission_holder_name()).unwrap_or("<none>"),
                message,
            ));
        }
        let existing = self.get(xid)?;
        if !self.roles.delete(&existing)? {
            return Err(CoreError::NotFound(format!("role {}", xid)));
        }
        self.reload()?;
        tracing::info!(xid = %xid, "Role deleted");
        Ok(existing)
    }

    // ========== System permissions ==========

    fn find_system_permission(&self, permission_type: &str) -> CoreResult<Option<SystemPermission>> {
        let spec = ConditionSortLimit::from_condition(Condition::eq("permission_type", permission_type));
        Ok(self.system_permissions.query_all(&spec)?.into_iter().next())
    }

    /// Current permission of `permission_type`, superadmin-only when unset
    pub fn get_system_permission(&self, permission_type: &str) -> CoreResult<Permission> {
        Ok(self
            .find_system_permission(permission_type)?
            .map(|p| p.permission)
            .unwrap_or_else(Permission::superadmin_only))
    }

    /// Replace the permission of `permission_type`
    pub fn set_system_permission(
        &self,
        holder: Option<&dyn PermissionHolder>,
        permission_type: &str,
        permission: Permission,
    ) -> CoreResult<()> {
        self.permission_service.ensure_admin_role(holder)?;
        let existing = self.find_system_permission(permission_type)?;

        let mut result = ValidationResult::new();
        self.permission_service.validate_permission(
            &mut result,
            "permission",
            holder,
            existing.as_ref().map(|p| &p.permission),
            &permission,
        );
        if !result.is_valid() {
            return Err(CoreError::Validation(result));
        }

        let mut next = SystemPermission {
            id: existing.as_ref().and_then(|p| p.id),
            permission_type: permission_type.to_string(),
            permission,
        };
        match existing {
            Some(old) => self.system_permissions.update(&old, &mut next),
            None => self.system_permissions.insert(&mut next),
        }
    }

    /// Grant `role` on `permission_type`. A role that is already present is
    /// a validation error.
    pub fn add_role_to_permission(
        &self,
        holder: Option<&dyn PermissionHolder>,
        role: &Role,
        permission_type: &str,
    ) -> CoreResult<()> {
        self.permission_service.ensure_admin_role(holder)?;
        let current = self.get_system_permission(permission_type)?;
        if current.contains_role(role) {
            let mut result = ValidationResult::new();
            result.add_generic_message(
                "roles.roleAlreadyAssignedToPermission",
                [role.xid.clone(), permission_type.to_string()],
            );
            return Err(CoreError::Validation(result));
        }
        self.set_system_permission(holder, permission_type, current.with_role(role.clone()))
    }

    /// Grant `role` in one permission column of a single entity
    ///
    /// `permission` picks the column out of the entity, `permission_type`
    /// names it in messages. The change goes through
    /// [`EntityStore::update_by_id`] so the update event is published. A role
    /// that is already present is a validation error.
    pub fn add_role_to_vo_permission<P: EntityPolicy>(
        &self,
        holder: Option<&dyn PermissionHolder>,
        role: &Role,
        store: &EntityStore<P>,
        vo_id: i64,
        permission_type: &str,
        permission: impl Fn(&mut P::Entity) -> &mut Permission,
    ) -> CoreResult<P::Entity> {
        self.permission_service.ensure_admin_role(holder)?;
        let table = store.policy().table().name();
        let mut next = store
            .get(vo_id)?
            .ok_or_else(|| CoreError::NotFound(format!("{} id={}", table, vo_id)))?;

        let slot = permission(&mut next);
        if slot.contains_role(role) {
            let mut result = ValidationResult::new();
            result.add_generic_message(
                "roles.roleAlreadyAssignedToPermission",
                [role.xid.clone(), permission_type.to_string(), table.to_string()],
            );
            return Err(CoreError::Validation(result));
        }
        *slot = std::mem::take(slot).with_role(role.clone());

        store.update_by_id(vo_id, &mut next)?;
        tracing::info!(xid = %role.xid, table, id = vo_id, permission_type, "Role added to permission");
        Ok(next)
    }

    /// Run `f` as the system superadmin
    pub fn as_system<T>(&self, f: impl FnOnce(&Self, &dyn PermissionHolder) -> CoreResult<T>) -> CoreResult<T> {
        f(self, system_superadmin())
    }
}
