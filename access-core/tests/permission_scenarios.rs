//! 权限场景测试
//!
//! 编辑权限的修改规则：没有超级管理员角色的持有者只能增删自己持有的角色，
//! 违规时返回字段级校验错误而不是拒绝访问

mod common;

use access_core::error::CoreError;
use access_core::permission::{Actor, PermissionService, system_superadmin};
use access_core::role::RoleGraph;
use access_core::store::MemoryStorage;
use common::{MailingList, MailingListPolicy, role, store_with, update_checked};
use shared::models::{Permission, Role};
use std::sync::Arc;

struct Fixture {
    graph: Arc<RoleGraph>,
    permissions: PermissionService,
    a: Role,
    b: Role,
    c: Role,
}

fn fixture() -> Fixture {
    let graph = Arc::new(RoleGraph::new());
    let (a, b, c) = (role(3, "A"), role(4, "B"), role(5, "C"));
    for r in [&a, &b, &c] {
        graph.register(r.clone(), [&Role::user()]).unwrap();
    }
    Fixture {
        permissions: PermissionService::new(Arc::clone(&graph)),
        graph,
        a,
        b,
        c,
    }
}

#[test]
fn removing_an_unheld_role_is_a_validation_error() {
    let f = fixture();
    let store = store_with(MailingListPolicy::default(), Arc::new(MemoryStorage::new()), 1);

    let edit = Permission::from_term_sets([
        vec![f.a.clone(), f.b.clone()],
        vec![f.a.clone(), f.c.clone()],
    ]);
    let mut list = MailingList::new("ML_1", "Operators").editable_by(edit);
    store.insert(&mut list).unwrap();

    let holder = Actor::resolve(&f.graph, "alice", [f.a.clone()]);
    assert!(f.permissions.has_permission(Some(&holder), &list.edit_permission));

    // 去掉 C，但 alice 并不持有 C
    let next = list
        .clone()
        .editable_by(Permission::from_term_sets([vec![f.a.clone(), f.b.clone()]]));
    let err = update_checked(&store, &f.permissions, &holder, &list, next).unwrap_err();

    let CoreError::Validation(result) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    let messages: Vec<_> = result.messages_for("editPermission").collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "validate.role.invalidModification");
    assert_eq!(messages[0].args, vec!["A,user"]);
    assert!(!result.has_message_for("readPermission"));

    // 存储未改变
    assert_eq!(store.get(1).unwrap().unwrap().edit_permission, list.edit_permission);
}

#[test]
fn changes_within_held_roles_are_accepted() {
    let f = fixture();
    let store = store_with(MailingListPolicy::default(), Arc::new(MemoryStorage::new()), 1);

    let mut list = MailingList::new("ML_1", "Operators")
        .editable_by(Permission::require_any_role([f.a.clone(), f.b.clone()]));
    store.insert(&mut list).unwrap();

    let holder = Actor::resolve(&f.graph, "alice", [f.a.clone()]);
    let next = list
        .clone()
        .editable_by(Permission::require_any_role([f.a.clone(), f.b.clone(), Role::user()]))
        .readable_by(Permission::require_any_role([f.a.clone()]));
    let saved = update_checked(&store, &f.permissions, &holder, &list, next).unwrap();

    let stored = store.get(1).unwrap().unwrap();
    assert_eq!(stored, saved);
    assert!(stored.edit_permission.contains_role(&Role::user()));
}

#[test]
fn missing_edit_permission_is_denied() {
    let f = fixture();
    let store = store_with(MailingListPolicy::default(), Arc::new(MemoryStorage::new()), 1);

    let mut list = MailingList::new("ML_1", "Operators")
        .editable_by(Permission::require_any_role([f.b.clone()]));
    store.insert(&mut list).unwrap();

    let holder = Actor::resolve(&f.graph, "alice", [f.a.clone()]);
    let err = update_checked(&store, &f.permissions, &holder, &list, list.clone()).unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied { ref holder, .. } if holder == "alice"));
}

#[test]
fn superadmin_may_change_anything_but_unknown_roles() {
    let f = fixture();
    let store = store_with(MailingListPolicy::default(), Arc::new(MemoryStorage::new()), 1);

    let mut list = MailingList::new("ML_1", "Operators")
        .editable_by(Permission::require_any_role([f.c.clone()]));
    store.insert(&mut list).unwrap();

    let unknown = role(99, "ghost");
    let next = list
        .clone()
        .editable_by(Permission::require_any_role([unknown]));
    let err = update_checked(&store, &f.permissions, system_superadmin(), &list, next).unwrap_err();
    let CoreError::Validation(result) = err else {
        panic!("expected a validation error");
    };
    let messages: Vec<_> = result.messages_for("editPermission").collect();
    assert_eq!(messages[0].message, "validate.role.notFound");
    assert_eq!(messages[0].args, vec!["ghost"]);

    let next = list
        .clone()
        .editable_by(Permission::require_any_role([f.a.clone()]));
    update_checked(&store, &f.permissions, system_superadmin(), &list, next).unwrap();
    assert!(store
        .get(1)
        .unwrap()
        .unwrap()
        .edit_permission
        .contains_role(&f.a));
}

#[test]
fn disabled_holder_cannot_edit() {
    let f = fixture();
    let store = store_with(MailingListPolicy::default(), Arc::new(MemoryStorage::new()), 1);
    let mut list = MailingList::new("ML_1", "Operators")
        .editable_by(Permission::require_any_role([f.a.clone()]));
    store.insert(&mut list).unwrap();

    let holder = Actor::resolve(&f.graph, "alice", [f.a.clone()]).disabled();
    assert!(!f.permissions.has_permission(Some(&holder), &list.edit_permission));
    let err = update_checked(&store, &f.permissions, &holder, &list, list.clone()).unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied { .. }));
}
