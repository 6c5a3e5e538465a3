//! 角色服务集成测试
//!
//! 角色继承影响读取限制，删除角色时从权限列中移除

mod common;

use access_core::config::StoreConfig;
use access_core::error::CoreError;
use access_core::permission::Actor;
use access_core::role::{RoleGraph, RoleService, service::PermissionColumn};
use access_core::store::{DaoEventType, MemoryStorage, Storage};
use common::{MAILING_LISTS, MailingList, MailingListPolicy, store_with};
use shared::models::{Permission, Role, RoleVo};
use std::sync::Arc;

struct Fixture {
    storage: Arc<dyn Storage>,
    graph: Arc<RoleGraph>,
    roles: RoleService,
    root: Actor,
}

fn fixture() -> Fixture {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let graph = Arc::new(RoleGraph::new());
    let roles = RoleService::new(
        Arc::clone(&storage),
        Arc::clone(&graph),
        &StoreConfig::default(),
        vec![PermissionColumn::new(MAILING_LISTS, "read_permission")],
    )
    .unwrap();
    Fixture {
        storage,
        graph,
        roles,
        root: Actor::new("root", [Role::superadmin()]),
    }
}

#[test]
fn inherited_roles_grant_read_access() {
    let f = fixture();
    let ops = f
        .roles
        .insert(Some(&f.root), RoleVo::new("ops", "Operators"))
        .unwrap()
        .role()
        .unwrap();
    let night = f
        .roles
        .insert(Some(&f.root), RoleVo::new("night", "Night").with_inherited([ops.clone()]))
        .unwrap()
        .role()
        .unwrap();

    let store = store_with(MailingListPolicy::default(), Arc::clone(&f.storage), 1);
    let mut list = MailingList::new("ML_OPS", "Ops")
        .readable_by(Permission::require_any_role([ops.clone()]));
    store.insert(&mut list).unwrap();

    let nora = Actor::resolve(&f.graph, "nora", [night]);
    assert_eq!(store.list(&nora).unwrap().len(), 1);

    let bob = Actor::resolve(&f.graph, "bob", [Role::user()]);
    assert!(store.list(&bob).unwrap().is_empty());
}

#[test]
fn deleting_a_role_strips_it_from_permission_columns() {
    let f = fixture();
    let ops = f
        .roles
        .insert(Some(&f.root), RoleVo::new("ops", "Operators"))
        .unwrap()
        .role()
        .unwrap();

    let store = store_with(MailingListPolicy::default(), Arc::clone(&f.storage), 1);
    let mut list = MailingList::new("ML_1", "Shared")
        .readable_by(Permission::require_any_role([ops.clone(), Role::user()]));
    store.insert(&mut list).unwrap();

    f.roles.delete(Some(&f.root), "ops").unwrap();

    let stored = store.get(1).unwrap().unwrap();
    assert!(!stored.read_permission.contains_role(&ops));
    assert_eq!(
        stored.read_permission,
        Permission::require_any_role([Role::user()])
    );
    assert!(matches!(f.roles.get("ops"), Err(CoreError::NotFound(_))));
}

#[test]
fn role_changes_need_superadmin() {
    let f = fixture();
    let ops = f
        .roles
        .insert(Some(&f.root), RoleVo::new("ops", "Operators"))
        .unwrap()
        .role()
        .unwrap();
    let olga = Actor::resolve(&f.graph, "olga", [ops.clone()]);

    for result in [
        f.roles.insert(Some(&olga), RoleVo::new("x", "X")).map(|_| ()),
        f.roles.update(Some(&olga), "ops", RoleVo::new("ops", "Renamed")).map(|_| ()),
        f.roles.delete(Some(&olga), "ops").map(|_| ()),
        f.roles.add_role_to_permission(Some(&olga), &ops, "permissions.alarms"),
    ] {
        assert!(matches!(result, Err(CoreError::PermissionDenied { .. })));
    }
    assert_eq!(f.roles.get("ops").unwrap().name, "Operators");
}

#[test]
fn system_permission_grants_follow_the_graph() {
    let f = fixture();
    let ops = f
        .roles
        .insert(Some(&f.root), RoleVo::new("ops", "Operators"))
        .unwrap()
        .role()
        .unwrap();
    f.roles
        .add_role_to_permission(Some(&f.root), &ops, "permissions.alarms.acknowledge")
        .unwrap();

    let permission = f
        .roles
        .get_system_permission("permissions.alarms.acknowledge")
        .unwrap();
    let service = f.roles.permission_service();
    let olga = Actor::resolve(&f.graph, "olga", [ops]);
    let bob = Actor::resolve(&f.graph, "bob", [Role::user()]);
    assert!(service.has_permission(Some(&olga), &permission));
    assert!(!service.has_permission(Some(&bob), &permission));
    assert!(!service.has_permission(None, &permission));
}

#[test]
fn reserved_roles_are_matched_without_case() {
    let f = fixture();
    let err = f
        .roles
        .insert(Some(&f.root), RoleVo::new("SuperAdmin", "imposter"))
        .unwrap_err();
    let CoreError::Validation(result) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    let messages: Vec<_> = result.messages_for("xid").collect();
    assert_eq!(messages[0].message, "roles.cannotAlterSuperadminRole");
    assert!(f.roles.get("SuperAdmin").is_err());

    let err = f.roles.delete(Some(&f.root), "USER").unwrap_err();
    assert!(
        matches!(err, CoreError::PermissionDenied { ref message, .. } if message == "roles.cannotAlterUserRole"),
        "got {err:?}"
    );
    assert_eq!(f.roles.list(Some(&f.root)).unwrap().len(), 2);
}

#[test]
fn roles_can_be_granted_on_a_single_list() {
    let f = fixture();
    let ops = f
        .roles
        .insert(Some(&f.root), RoleVo::new("ops", "Operators"))
        .unwrap()
        .role()
        .unwrap();
    let store = store_with(MailingListPolicy::default(), Arc::clone(&f.storage), 1);
    let mut list = MailingList::new("ML_1", "Ops")
        .readable_by(Permission::require_any_role([Role::user()]));
    store.insert(&mut list).unwrap();
    let id = list.id.unwrap();
    let mut events = store.subscribe();

    let saved = f
        .roles
        .add_role_to_vo_permission(Some(&f.root), &ops, &store, id, "read", |l| {
            &mut l.edit_permission
        })
        .unwrap();
    assert!(saved.edit_permission.contains_role(&ops));
    assert!(store.get(id).unwrap().unwrap().edit_permission.contains_role(&ops));

    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, DaoEventType::Update);
    assert!(!event.original.unwrap().edit_permission.contains_role(&ops));

    // 重复授予是校验错误，且不会再写一次
    let err = f
        .roles
        .add_role_to_vo_permission(Some(&f.root), &ops, &store, id, "read", |l| {
            &mut l.edit_permission
        })
        .unwrap_err();
    let CoreError::Validation(result) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(result.messages()[0].message, "roles.roleAlreadyAssignedToPermission");
    assert_eq!(result.messages()[0].args, vec!["ops", "read", MAILING_LISTS]);
    assert!(events.try_recv().is_err());

    let olga = Actor::resolve(&f.graph, "olga", [ops.clone()]);
    let denied = f.roles.add_role_to_vo_permission(Some(&olga), &ops, &store, id, "read", |l| {
        &mut l.read_permission
    });
    assert!(matches!(denied, Err(CoreError::PermissionDenied { .. })));
    assert!(matches!(
        f.roles
            .add_role_to_vo_permission(Some(&f.root), &ops, &store, 99, "read", |l| {
                &mut l.read_permission
            }),
        Err(CoreError::NotFound(_))
    ));
}
