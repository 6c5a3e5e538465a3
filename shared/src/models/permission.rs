//! Permission Model
//!
//! A [`Permission`] is a conjunction of disjunctions over roles. Each term-set
//! is an OR, the set of term-sets is an AND. The empty permission has no
//! term-sets and is only satisfied through the superadmin bypass.

use super::role::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Access policy over roles (AND of ORs)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission {
    roles: BTreeSet<BTreeSet<Role>>,
}

impl Permission {
    /// Permission nobody but superadmin satisfies
    pub fn superadmin_only() -> Self {
        Self::default()
    }

    /// Build from raw term-sets, empty term-sets are dropped
    pub fn from_term_sets<I, T>(term_sets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = Role>,
    {
        let roles = term_sets
            .into_iter()
            .map(|t| t.into_iter().collect::<BTreeSet<_>>())
            .filter(|t| !t.is_empty())
            .collect();
        Self { roles }
    }

    /// Single term-set, any one role of `roles` suffices
    pub fn require_any_role(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::from_term_sets([roles])
    }

    /// One term-set per role, every role is required
    pub fn require_all_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::from_term_sets(roles.into_iter().map(|r| [r]))
    }

    /// Union of term-sets, both permissions must now be satisfied
    pub fn and(mut self, other: Permission) -> Self {
        self.roles.extend(other.roles);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn role_sets(&self) -> &BTreeSet<BTreeSet<Role>> {
        &self.roles
    }

    /// Every role referenced by any term-set
    pub fn unique_roles(&self) -> BTreeSet<Role> {
        self.roles.iter().flatten().cloned().collect()
    }

    pub fn contains_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|t| t.contains(role))
    }

    /// Grant `role`: it is added to every term-set, or becomes the only term-set
    pub fn with_role(self, role: Role) -> Self {
        if self.roles.is_empty() {
            return Self::require_any_role([role]);
        }
        let roles = self
            .roles
            .into_iter()
            .map(|mut t| {
                t.insert(role.clone());
                t
            })
            .collect();
        Self { roles }
    }

    /// Remove `role` everywhere, term-sets left empty are dropped
    pub fn without_role(&self, role: &Role) -> Self {
        Self::from_term_sets(
            self.roles
                .iter()
                .map(|t| t.iter().filter(|r| *r != role).cloned().collect::<Vec<_>>()),
        )
    }

    /// Evaluate against a role closure
    ///
    /// True when the closure contains superadmin, otherwise every term-set
    /// must intersect the closure. An empty permission is false here.
    pub fn is_satisfied_by(&self, closure: &BTreeSet<Role>) -> bool {
        if closure.iter().any(Role::is_superadmin) {
            return true;
        }
        if self.roles.is_empty() {
            return false;
        }
        self.roles
            .iter()
            .all(|term| term.iter().any(|r| closure.contains(r)))
    }

    /// Storage encoding (JSON array of term-sets)
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .roles
            .iter()
            .map(|t| {
                let xids: Vec<&str> = t.iter().map(|r| r.xid.as_str()).collect();
                format!("({})", xids.join("|"))
            })
            .collect();
        f.write_str(&terms.join("&"))
    }
}
