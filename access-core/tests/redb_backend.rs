//! redb 后端端到端测试

mod common;

use access_core::config::StoreConfig;
use access_core::permission::Actor;
use access_core::role::{RoleGraph, RoleService, service::PermissionColumn};
use access_core::store::{RedbStorage, RowSource, Storage};
use common::{MAILING_LISTS, MailingList, MailingListPolicy, RECIPIENTS, store_with};
use shared::models::{Permission, Role, RoleVo};
use std::sync::Arc;

fn open(path: &std::path::Path) -> Arc<dyn Storage> {
    Arc::new(RedbStorage::open(path).unwrap())
}

#[test]
fn mailing_lists_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lists.redb");

    {
        let store = store_with(MailingListPolicy::default(), open(&path), 2);
        let mut a = MailingList::new("ML_A", "Alpha").with_recipients(&["a@x.io", "b@x.io"]);
        let mut b = MailingList::new("ML_B", "Bravo").with_recipients(&["c@x.io"]);
        store.insert(&mut a).unwrap();
        store.insert(&mut b).unwrap();
        assert!(store.delete(&a).unwrap());
    }

    let storage = open(&path);
    let store = store_with(MailingListPolicy::default(), Arc::clone(&storage), 2);
    let all = store.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].xid, "ML_B");
    assert_eq!(all[0].recipients, vec!["c@x.io"]);
    assert_eq!(storage.scan(RECIPIENTS).unwrap().len(), 1);

    // 序列在重启后继续增长
    let mut c = MailingList::new("ML_C", "Charlie");
    store.insert(&mut c).unwrap();
    assert_eq!(c.id, Some(3));
}

#[test]
fn queries_run_against_redb_rows() {
    let storage: Arc<dyn Storage> = Arc::new(RedbStorage::open_in_memory().unwrap());
    let store = store_with(MailingListPolicy::default(), Arc::clone(&storage), 1);
    let root = Actor::new("root", [Role::superadmin()]);
    let bob = Actor::new("bob", [Role::user()]);

    for (xid, alarms) in [("ML_1", true), ("ML_2", false), ("ML_3", true)] {
        let mut list = MailingList::new(xid, xid)
            .readable_by(Permission::require_any_role([Role::user()]));
        list.receive_alarm_emails = alarms;
        store.insert(&mut list).unwrap();
    }
    let mut hidden = MailingList::new("ML_4", "hidden");
    hidden.receive_alarm_emails = true;
    store.insert(&mut hidden).unwrap();

    let xids: Vec<String> = store
        .query(&bob, "receiveAlarmEmails=true&sort(-xid)")
        .unwrap()
        .into_iter()
        .map(|l| l.xid)
        .collect();
    assert_eq!(xids, vec!["ML_3", "ML_1"]);
    assert_eq!(store.count_query(&root, "receiveAlarmEmails=true").unwrap(), 3);
    assert!(storage.fetch(MAILING_LISTS, 4).unwrap().is_some());
}

#[test]
fn roles_reload_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roles.redb");
    let config = StoreConfig::default();
    let root = Actor::new("root", [Role::superadmin()]);

    {
        let service = RoleService::new(open(&path), Arc::new(RoleGraph::new()), &config, Vec::new())
            .unwrap();
        let ops = service.insert(Some(&root), RoleVo::new("ops", "Operators")).unwrap();
        service
            .insert(
                Some(&root),
                RoleVo::new("night", "Night shift").with_inherited([ops.role().unwrap()]),
            )
            .unwrap();
    }

    let graph = Arc::new(RoleGraph::new());
    let service = RoleService::new(
        open(&path),
        Arc::clone(&graph),
        &config,
        vec![PermissionColumn::new(MAILING_LISTS, "read_permission")],
    )
    .unwrap();

    // 引导角色不会被重复创建
    assert_eq!(service.list(Some(&root)).unwrap().len(), 4);
    let closure = graph.closure("night");
    let xids: Vec<&str> = closure.iter().map(|r| r.xid.as_str()).collect();
    assert_eq!(xids, vec!["night", "ops"]);
}
