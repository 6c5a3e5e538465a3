//! Role inheritance graph
//!
//! Roles live in an arena (`Vec<RoleNode>`) with parent edges stored as
//! indices. Readers take an `Arc` of the current [`RoleGraphSnapshot`] and
//! traverse it without holding any lock; writers build a new snapshot and
//! swap it in, so a half-applied change is never visible.
//!
//! Inheritance is not required to be acyclic. Closures are computed with a
//! visited set and always terminate; cycles are reported through
//! [`RoleGraph::find_cycles`] and logged when a change introduces one.

use crate::error::{CoreError, CoreResult};
use crate::permission::PermissionHolder;
use parking_lot::{Mutex, RwLock};
use shared::models::{Role, RoleVo};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct RoleNode {
    role: Role,
    /// Directly inherited roles
    parents: Vec<usize>,
}

/// Immutable view of the graph
#[derive(Debug, Clone, Default)]
pub struct RoleGraphSnapshot {
    nodes: Vec<RoleNode>,
    index: HashMap<String, usize>,
}

impl RoleGraphSnapshot {
    /// Graph holding only the bootstrap roles
    pub fn bootstrap() -> Self {
        let mut snapshot = Self::default();
        snapshot.upsert(Role::superadmin());
        snapshot.upsert(Role::user());
        snapshot
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, xid: &str) -> Option<&Role> {
        self.index.get(xid).map(|&i| &self.nodes[i].role)
    }

    pub fn contains(&self, role: &Role) -> bool {
        self.get(&role.xid) == Some(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.nodes.iter().map(|n| &n.role)
    }

    /// Direct parents of `xid`
    pub fn parents(&self, xid: &str) -> BTreeSet<Role> {
        self.index
            .get(xid)
            .map(|&i| {
                self.nodes[i]
                    .parents
                    .iter()
                    .map(|&p| self.nodes[p].role.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The role plus everything it inherits, empty for an unknown xid
    pub fn closure(&self, xid: &str) -> BTreeSet<Role> {
        match self.index.get(xid) {
            Some(&start) => self.reachable([start]),
            None => BTreeSet::new(),
        }
    }

    /// Closure of a set of directly held roles
    ///
    /// Roles the graph does not know are kept as they are, they simply
    /// inherit nothing.
    pub fn closure_of_roles<'a>(&self, roles: impl IntoIterator<Item = &'a Role>) -> BTreeSet<Role> {
        let mut unknown = BTreeSet::new();
        let mut starts = Vec::new();
        for role in roles {
            match self.index.get(&role.xid) {
                Some(&i) => starts.push(i),
                None => {
                    unknown.insert(role.clone());
                }
            }
        }
        let mut closure = self.reachable(starts);
        closure.extend(unknown);
        closure
    }

    fn reachable(&self, starts: impl IntoIterator<Item = usize>) -> BTreeSet<Role> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = starts.into_iter().collect();
        let mut closure = BTreeSet::new();
        while let Some(i) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            closure.insert(self.nodes[i].role.clone());
            stack.extend(self.nodes[i].parents.iter().copied().filter(|&p| !visited[p]));
        }
        closure
    }

    /// Every inheritance cycle, as the xids along it
    ///
    /// Depth-first with an explicit stack, so long inheritance chains cannot
    /// exhaust the thread stack.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut cycles = Vec::new();
        // (节点, 下一个要看的父节点下标)，同时也是当前路径
        let mut path: Vec<(usize, usize)> = Vec::new();

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::New {
                continue;
            }
            marks[start] = Mark::Active;
            path.push((start, 0));

            while let Some(top) = path.last_mut() {
                let node = top.0;
                let Some(&parent) = self.nodes[node].parents.get(top.1) else {
                    marks[node] = Mark::Done;
                    path.pop();
                    continue;
                };
                top.1 += 1;
                match marks[parent] {
                    Mark::New => {
                        marks[parent] = Mark::Active;
                        path.push((parent, 0));
                    }
                    Mark::Active => {
                        if let Some(pos) = path.iter().position(|&(n, _)| n == parent) {
                            cycles.push(
                                path[pos..]
                                    .iter()
                                    .map(|&(n, _)| self.nodes[n].role.xid.clone())
                                    .collect(),
                            );
                        }
                    }
                    Mark::Done => {}
                }
            }
        }
        cycles
    }

    pub fn has_cycles(&self) -> bool {
        !self.find_cycles().is_empty()
    }

    fn upsert(&mut self, role: Role) -> usize {
        match self.index.get(&role.xid) {
            Some(&i) => {
                self.nodes[i].role = role;
                i
            }
            None => {
                let i = self.nodes.len();
                self.index.insert(role.xid.clone(), i);
                self.nodes.push(RoleNode {
                    role,
                    parents: Vec::new(),
                });
                i
            }
        }
    }

    fn parent_indices<'a>(&self, parents: impl IntoIterator<Item = &'a Role>) -> CoreResult<Vec<usize>> {
        parents
            .into_iter()
            .map(|p| {
                self.index
                    .get(&p.xid)
                    .copied()
                    .ok_or_else(|| CoreError::invalid_argument(format!("unknown parent role {}", p.xid)))
            })
            .collect()
    }

    fn without(&self, xid: &str) -> Option<Self> {
        let removed = *self.index.get(xid)?;
        let remap = |i: usize| if i > removed { i - 1 } else { i };

        let mut next = Self::default();
        for (i, node) in self.nodes.iter().enumerate() {
            if i == removed {
                continue;
            }
            next.index.insert(node.role.xid.clone(), next.nodes.len());
            next.nodes.push(RoleNode {
                role: node.role.clone(),
                parents: node
                    .parents
                    .iter()
                    .filter(|&&p| p != removed)
                    .map(|&p| remap(p))
                    .collect(),
            });
        }
        Some(next)
    }
}

/// Shared, swappable role graph
#[derive(Debug)]
pub struct RoleGraph {
    current: RwLock<Arc<RoleGraphSnapshot>>,
    /// Serializes writers so no change is lost between read and swap
    write_lock: Mutex<()>,
}

impl Default for RoleGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleGraph {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RoleGraphSnapshot::bootstrap())),
            write_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<RoleGraphSnapshot> {
        self.current.read().clone()
    }

    fn swap(&self, next: RoleGraphSnapshot) {
        let cycles = next.find_cycles();
        if !cycles.is_empty() {
            tracing::warn!(?cycles, "Role inheritance contains cycles");
        }
        *self.current.write() = Arc::new(next);
    }

    /// Add a role, or replace the parents of an existing one
    pub fn register<'a>(&self, role: Role, parents: impl IntoIterator<Item = &'a Role>) -> CoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut next = RoleGraphSnapshot::clone(&self.snapshot());
        let parents = next.parent_indices(parents)?;
        let i = next.upsert(role);
        next.nodes[i].parents = parents;
        self.swap(next);
        Ok(())
    }

    /// Rebuild from persisted roles
    ///
    /// The bootstrap roles are always present. Parents that are not among
    /// `roles` are dropped with a warning.
    pub fn replace_all(&self, roles: &[RoleVo]) {
        let _guard = self.write_lock.lock();
        let mut next = RoleGraphSnapshot::bootstrap();
        for vo in roles {
            if let Some(role) = vo.role() {
                next.upsert(role);
            }
        }
        for vo in roles {
            let Some(&i) = next.index.get(&vo.xid) else {
                continue;
            };
            let mut parents = Vec::new();
            for parent in &vo.inherited {
                match next.index.get(&parent.xid) {
                    Some(&p) => parents.push(p),
                    None => tracing::warn!(role = %vo.xid, parent = %parent.xid, "Dropping unknown parent role"),
                }
            }
            next.nodes[i].parents = parents;
        }
        tracing::debug!(roles = next.len(), "Role graph rebuilt");
        self.swap(next);
    }

    /// Drop a role and every edge pointing at it
    pub fn remove(&self, xid: &str) -> bool {
        let _guard = self.write_lock.lock();
        match self.snapshot().without(xid) {
            Some(next) => {
                self.swap(next);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, xid: &str) -> Option<Role> {
        self.snapshot().get(xid).cloned()
    }

    pub fn closure(&self, xid: &str) -> BTreeSet<Role> {
        self.snapshot().closure(xid)
    }

    pub fn closure_of_roles<'a>(&self, roles: impl IntoIterator<Item = &'a Role>) -> BTreeSet<Role> {
        self.snapshot().closure_of_roles(roles)
    }

    /// Closure of everything `holder` holds
    pub fn closure_of(&self, holder: &dyn PermissionHolder) -> BTreeSet<Role> {
        self.snapshot().closure_of_roles(holder.all_inherited_roles())
    }

    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        self.snapshot().find_cycles()
    }

    pub fn has_cycles(&self) -> bool {
        self.snapshot().has_cycles()
    }
}
