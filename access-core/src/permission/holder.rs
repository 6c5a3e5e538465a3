//! Permission holders
//!
//! Anything that can be checked against a [`Permission`](shared::Permission):
//! logged in users, API tokens, background jobs. The check only needs the
//! holder's name for audit, its disabled flag and its full role closure.

use crate::role::RoleGraph;
use shared::models::Role;
use std::collections::BTreeSet;
use std::sync::LazyLock;

pub trait PermissionHolder: Send + Sync {
    fn permission_holder_name(&self) -> &str;

    fn is_permission_holder_disabled(&self) -> bool;

    /// Held roles plus everything they inherit
    fn all_inherited_roles(&self) -> &BTreeSet<Role>;

    fn has_superadmin_role(&self) -> bool {
        self.all_inherited_roles().iter().any(Role::is_superadmin)
    }
}

/// A holder with a fixed role set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    name: String,
    disabled: bool,
    roles: BTreeSet<Role>,
    inherited: BTreeSet<Role>,
}

impl Actor {
    /// Actor whose `roles` are taken as its whole closure
    pub fn new(name: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        let roles: BTreeSet<Role> = roles.into_iter().collect();
        Self {
            name: name.into(),
            disabled: false,
            inherited: roles.clone(),
            roles,
        }
    }

    /// Actor whose closure is resolved against the role graph
    pub fn resolve(graph: &RoleGraph, name: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        let roles: BTreeSet<Role> = roles.into_iter().collect();
        let inherited = graph.closure_of_roles(&roles);
        Self {
            name: name.into(),
            disabled: false,
            roles,
            inherited,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Directly held roles
    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }
}

impl PermissionHolder for Actor {
    fn permission_holder_name(&self) -> &str {
        &self.name
    }

    fn is_permission_holder_disabled(&self) -> bool {
        self.disabled
    }

    fn all_inherited_roles(&self) -> &BTreeSet<Role> {
        &self.inherited
    }
}

pub const SYSTEM_SUPERADMIN_NAME: &str = "SYSTEM_SUPERADMIN";

/// Holder for work with no logged in actor
#[derive(Debug)]
pub struct SystemSuperadmin {
    roles: BTreeSet<Role>,
}

impl PermissionHolder for SystemSuperadmin {
    fn permission_holder_name(&self) -> &str {
        SYSTEM_SUPERADMIN_NAME
    }

    fn is_permission_holder_disabled(&self) -> bool {
        false
    }

    fn all_inherited_roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }
}

pub static SYSTEM_SUPERADMIN: LazyLock<SystemSuperadmin> = LazyLock::new(|| SystemSuperadmin {
    roles: BTreeSet::from([Role::superadmin(), Role::user()]),
});

pub fn system_superadmin() -> &'static dyn PermissionHolder {
    &*SYSTEM_SUPERADMIN
}
