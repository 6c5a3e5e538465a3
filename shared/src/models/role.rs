//! Role Model

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Xid of the superadmin role, satisfies every permission
pub const SUPERADMIN_ROLE_XID: &str = "superadmin";
/// Xid of the base role every user holds
pub const USER_ROLE_XID: &str = "user";
/// Internal key of the superadmin role
pub const SUPERADMIN_ROLE_ID: i64 = 1;
/// Internal key of the user role
pub const USER_ROLE_ID: i64 = 2;

/// Role reference (RBAC 角色)
///
/// Identity is the pair of internal key and stable external id. Ordering is by
/// xid first, which is the order used for audit output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub xid: String,
}

impl Role {
    pub fn new(id: i64, xid: impl Into<String>) -> Self {
        Self {
            id,
            xid: xid.into(),
        }
    }

    pub fn superadmin() -> Self {
        Self::new(SUPERADMIN_ROLE_ID, SUPERADMIN_ROLE_XID)
    }

    pub fn user() -> Self {
        Self::new(USER_ROLE_ID, USER_ROLE_XID)
    }

    pub fn is_superadmin(&self) -> bool {
        self.xid == SUPERADMIN_ROLE_XID
    }

    /// Superadmin and user are created at bootstrap and never altered
    pub fn is_reserved(&self) -> bool {
        is_reserved_xid(&self.xid)
    }
}

/// Check if `xid` names one of the bootstrap roles
pub fn is_reserved_xid(xid: &str) -> bool {
    xid == SUPERADMIN_ROLE_XID || xid == USER_ROLE_XID
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> Ordering {
        self.xid
            .cmp(&other.xid)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.xid)
    }
}

/// Persisted role with its direct parents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleVo {
    /// `None` until the role is inserted
    pub id: Option<i64>,
    pub xid: String,
    pub name: String,
    /// Directly inherited roles
    #[serde(default)]
    pub inherited: BTreeSet<Role>,
}

impl RoleVo {
    pub fn new(xid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            xid: xid.into(),
            name: name.into(),
            inherited: BTreeSet::new(),
        }
    }

    pub fn with_inherited(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.inherited.extend(roles);
        self
    }

    /// Role reference, available once the role has an id
    pub fn role(&self) -> Option<Role> {
        self.id.map(|id| Role::new(id, self.xid.clone()))
    }
}
