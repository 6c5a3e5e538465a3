//! Permission evaluation
//!
//! Every check takes an optional holder, `None` being a request without an
//! actor. A missing or disabled holder fails every check. A holder whose
//! closure contains superadmin passes every check that is not about argument
//! validity.
//!
//! The `has_*` functions answer with a bool, the `ensure_*` functions turn a
//! `false` into [`CoreError::PermissionDenied`] and log it on the security
//! target.

use super::holder::PermissionHolder;
use crate::error::{CoreError, CoreResult};
use crate::query::Condition;
use crate::role::RoleGraph;
use crate::security_log;
use shared::error::ValidationResult;
use shared::models::{Permission, Role};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Name used in audit output when there is no holder
const NO_HOLDER: &str = "<none>";

fn holder_name(holder: Option<&dyn PermissionHolder>) -> String {
    holder
        .map(|h| h.permission_holder_name().to_string())
        .unwrap_or_else(|| NO_HOLDER.to_string())
}

/// Comma separated role xids, sorted, no spaces
pub fn implode<'a>(roles: impl IntoIterator<Item = &'a Role>) -> String {
    let sorted: BTreeSet<&Role> = roles.into_iter().collect();
    sorted
        .into_iter()
        .map(|r| r.xid.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone)]
pub struct PermissionService {
    graph: Arc<RoleGraph>,
}

impl PermissionService {
    pub fn new(graph: Arc<RoleGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Arc<RoleGraph> {
        &self.graph
    }

    fn valid(holder: Option<&dyn PermissionHolder>) -> Option<&dyn PermissionHolder> {
        holder.filter(|h| !h.is_permission_holder_disabled())
    }

    fn deny(holder: Option<&dyn PermissionHolder>, message: impl Into<String>) -> CoreError {
        let name = holder_name(holder);
        let message = message.into();
        security_log!(WARN, "permission_denied", holder = %name, reason = %message);
        CoreError::permission_denied(name, message)
    }

    // ========== Holders ==========

    pub fn is_valid_permission_holder(&self, holder: Option<&dyn PermissionHolder>) -> bool {
        Self::valid(holder).is_some()
    }

    /// The holder itself, if it is present and enabled
    pub fn ensure_valid_permission_holder<'a>(
        &self,
        holder: Option<&'a dyn PermissionHolder>,
    ) -> CoreResult<&'a dyn PermissionHolder> {
        match holder {
            None => Err(Self::deny(holder, "permission.exception.noHolder")),
            Some(h) if h.is_permission_holder_disabled() => {
                Err(Self::deny(holder, "permission.exception.holderDisabled"))
            }
            Some(h) => Ok(h),
        }
    }

    pub fn has_admin_role(&self, holder: Option<&dyn PermissionHolder>) -> bool {
        Self::valid(holder).is_some_and(|h| h.has_superadmin_role())
    }

    pub fn ensure_admin_role(&self, holder: Option<&dyn PermissionHolder>) -> CoreResult<()> {
        if self.has_admin_role(holder) {
            Ok(())
        } else {
            Err(Self::deny(holder, "permission.exception.mustBeAdmin"))
        }
    }

    // ========== Permissions ==========

    pub fn has_permission(&self, holder: Option<&dyn PermissionHolder>, permission: &Permission) -> bool {
        Self::valid(holder).is_some_and(|h| permission.is_satisfied_by(h.all_inherited_roles()))
    }

    pub fn ensure_permission(
        &self,
        holder: Option<&dyn PermissionHolder>,
        permission: &Permission,
    ) -> CoreResult<()> {
        if self.has_permission(holder, permission) {
            Ok(())
        } else {
            Err(Self::deny(
                holder,
                format!("permission.exception.doesNotHavePermission: {}", permission),
            ))
        }
    }

    // ========== Roles ==========

    /// Holds at least one of `roles`. An empty set is only satisfied by superadmin.
    pub fn has_any_role(&self, holder: Option<&dyn PermissionHolder>, roles: &BTreeSet<Role>) -> bool {
        let Some(h) = Self::valid(holder) else {
            return false;
        };
        if h.has_superadmin_role() {
            return true;
        }
        let held = h.all_inherited_roles();
        roles.iter().any(|r| held.contains(r))
    }

    /// Holds every one of `roles`. An empty set is only satisfied by superadmin.
    pub fn has_all_roles(&self, holder: Option<&dyn PermissionHolder>, roles: &BTreeSet<Role>) -> bool {
        let Some(h) = Self::valid(holder) else {
            return false;
        };
        if h.has_superadmin_role() {
            return true;
        }
        let held = h.all_inherited_roles();
        !roles.is_empty() && roles.iter().all(|r| held.contains(r))
    }

    /// Argument check shared by the `ensure_has_*_role` functions
    fn role_argument(roles: Option<&[Option<Role>]>) -> CoreResult<BTreeSet<Role>> {
        let roles = roles.ok_or_else(|| CoreError::invalid_argument("role set must not be null"))?;
        roles
            .iter()
            .map(|r| {
                r.clone()
                    .ok_or_else(|| CoreError::invalid_argument("role set must not contain null"))
            })
            .collect()
    }

    pub fn ensure_has_any_role(
        &self,
        holder: Option<&dyn PermissionHolder>,
        roles: Option<&[Option<Role>]>,
    ) -> CoreResult<()> {
        let roles = Self::role_argument(roles)?;
        if self.has_any_role(holder, &roles) {
            Ok(())
        } else {
            Err(Self::deny(
                holder,
                format!("permission.exception.mustHaveAnyRole: {}", implode(&roles)),
            ))
        }
    }

    pub fn ensure_has_all_roles(
        &self,
        holder: Option<&dyn PermissionHolder>,
        roles: Option<&[Option<Role>]>,
    ) -> CoreResult<()> {
        let roles = Self::role_argument(roles)?;
        if self.has_all_roles(holder, &roles) {
            Ok(())
        } else {
            Err(Self::deny(
                holder,
                format!("permission.exception.mustHaveAllRoles: {}", implode(&roles)),
            ))
        }
    }

    /// Holds `role`. Superadmin passes even without a role.
    pub fn ensure_single_role(
        &self,
        holder: Option<&dyn PermissionHolder>,
        role: Option<&Role>,
    ) -> CoreResult<()> {
        if self.has_admin_role(holder) {
            return Ok(());
        }
        let held = Self::valid(holder)
            .zip(role)
            .is_some_and(|(h, r)| h.all_inherited_roles().contains(r));
        if held {
            Ok(())
        } else {
            let wanted = role.map(|r| r.xid.as_str()).unwrap_or("null");
            Err(Self::deny(
                holder,
                format!("permission.exception.mustHaveRole: {}", wanted),
            ))
        }
    }

    // ========== Validation ==========

    /// Check that `holder` may change a permission from `existing` to `new`
    ///
    /// Problems are added to `result` under `key` (e.g. `editPermission`)
    /// rather than raised, so the caller can report them next to the field:
    ///
    /// - every role must exist
    /// - a holder without superadmin may only add roles it holds
    /// - a holder without superadmin may only remove roles it holds
    pub fn validate_permission(
        &self,
        result: &mut ValidationResult,
        key: &str,
        holder: Option<&dyn PermissionHolder>,
        existing: Option<&Permission>,
        new: &Permission,
    ) {
        let Some(h) = Self::valid(holder) else {
            result.add_contextual_message(key, "validate.invalidPermissionHolder");
            return;
        };

        let graph = self.graph.snapshot();
        let new_roles = new.unique_roles();
        for role in &new_roles {
            if !graph.contains(role) {
                result.add_contextual_message_with_args(key, "validate.role.notFound", [role.xid.clone()]);
            }
        }

        if h.has_superadmin_role() {
            return;
        }

        let held = h.all_inherited_roles();
        let old_roles = existing.map(Permission::unique_roles).unwrap_or_default();

        let added = new_roles.difference(&old_roles).any(|r| !held.contains(r));
        let removed = old_roles.difference(&new_roles).any(|r| !held.contains(r));
        if added || removed {
            result.add_contextual_message_with_args(
                key,
                "validate.role.invalidModification",
                [implode(held)],
            );
        }
    }

    /// Row restriction for entities whose read permission is stored in `column`
    ///
    /// `None` means no restriction.
    pub fn read_restriction(holder: Option<&dyn PermissionHolder>, column: &str) -> Option<Condition> {
        match Self::valid(holder) {
            None => Some(Condition::False),
            Some(h) if h.has_superadmin_role() => None,
            Some(h) => Some(Condition::Permitted {
                column: column.to_string(),
                roles: h.all_inherited_roles().clone(),
            }),
        }
    }
}
