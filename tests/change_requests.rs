mod common;

use atomstore::{
    AtomError, ChangeRequest, ChangeRequestType, ObjectKey, Query, UpdatedObject, Value,
};
use common::{Color, Equipment, Monster, Orb, Weapon, insert_all, names, open, raw};
use tempfile::tempdir;

fn pk(name: &str) -> ObjectKey {
    ObjectKey::PrimaryKey(vec![Value::Text(name.into())])
}

fn install_write_log(conn: &rusqlite::Connection) {
    conn.execute_batch(
        "CREATE TABLE write_log (target TEXT, kind TEXT);
         CREATE TRIGGER hp_insert AFTER INSERT ON monster__hp
             BEGIN INSERT INTO write_log VALUES ('hp', 'insert'); END;
         CREATE TRIGGER hp_update AFTER UPDATE ON monster__hp
             BEGIN INSERT INTO write_log VALUES ('hp', 'update'); END;
         CREATE TRIGGER mana_insert AFTER INSERT ON monster__mana
             BEGIN INSERT INTO write_log VALUES ('mana', 'insert'); END;
         CREATE TRIGGER mana_update AFTER UPDATE ON monster__mana
             BEGIN INSERT INTO write_log VALUES ('mana', 'update'); END;",
    )
    .expect("install triggers");
}

fn logged(conn: &rusqlite::Connection) -> Vec<(String, String)> {
    let mut stmt = conn
        .prepare("SELECT target, kind FROM write_log ORDER BY rowid")
        .expect("prepare");
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows")
}

#[test]
fn only_changed_index_columns_are_written() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    let stored = insert_all(&workspace, vec![Monster::new("imp", 10, 5)]);
    let conn = raw(dir.path());
    install_write_log(&conn);

    let outcome = workspace
        .perform_changes(|txn| {
            let mut request = txn.change_request(&stored[0])?.expect("present");
            txn.submit(&mut request)
        })
        .expect("identity update");
    assert!(matches!(outcome, UpdatedObject::Identity(_)));
    assert!(logged(&conn).is_empty());
    assert_eq!(workspace.changes_timestamp(), 1, "nothing written");

    workspace
        .perform_changes(|txn| {
            let mut request = txn.change_request(&stored[0])?.expect("present");
            request.hp = 6;
            txn.submit(&mut request)
        })
        .expect("hp update");
    assert_eq!(logged(&conn), vec![("hp".to_string(), "update".to_string())]);
    assert_eq!(workspace.changes_timestamp(), 2);

    workspace
        .perform_changes(|txn| {
            let mut request = txn.change_request(&stored[0])?.expect("present");
            request.color = Color::Blue;
            txn.submit(&mut request)
        })
        .expect("color update");
    assert_eq!(logged(&conn).len(), 1, "hp and mana untouched");
}

#[test]
fn change_requests_start_from_the_committed_state() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    let stale = insert_all(&workspace, vec![Monster::new("imp", 0, 10)]).remove(0);

    workspace
        .perform_changes(|txn| {
            let mut request = txn.change_request(&stale)?.expect("present");
            request.hp = 99;
            txn.submit(&mut request)
        })
        .expect("hp update");

    workspace
        .perform_changes(|txn| {
            let mut request = txn.change_request(&stale)?.expect("present");
            assert_eq!(request.hp, 99);
            request.mana = 1;
            txn.submit(&mut request)
        })
        .expect("mana update");

    let stored = workspace.object::<Monster>(pk("imp")).expect("load").expect("present");
    assert_eq!((stored.hp, stored.mana), (99, 1));
    let wounded = workspace
        .fetch(&Query::filter(Monster::hp().eq(99)))
        .expect("fetch");
    assert_eq!(names(&wounded), vec!["imp"]);
}

#[test]
fn submitting_a_committed_request_fails() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    workspace
        .perform_changes(|txn| {
            let mut request = ChangeRequest::creation(Monster::new("imp", 1, 1));
            assert_eq!(request.kind(), ChangeRequestType::Creation);
            txn.submit(&mut request)?;
            assert_eq!(request.kind(), ChangeRequestType::None);
            assert!(request.rowid() > 0);

            let err = txn.submit(&mut request).expect_err("second submit");
            assert!(matches!(err, AtomError::AlreadyCommitted { .. }));
            Ok(())
        })
        .expect("transaction");
    assert_eq!(workspace.fetch_all::<Monster>().expect("fetch").len(), 1);
}

#[test]
fn upsert_updates_existing_atoms_by_primary_key() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    let stored = insert_all(&workspace, vec![Monster::new("imp", 1, 1)]);

    workspace
        .perform_changes(|txn| {
            let mut existing = txn.upsert_request(Monster::new("imp", 9, 9))?;
            assert_eq!(existing.kind(), ChangeRequestType::Update);
            assert_eq!(existing.rowid(), stored[0].meta.rowid);
            txn.submit(&mut existing)?;

            let mut fresh = txn.upsert_request(Monster::new("ogre", 2, 2))?;
            assert_eq!(fresh.kind(), ChangeRequestType::Creation);
            txn.submit(&mut fresh)?;
            Ok(())
        })
        .expect("upserts");

    let found = workspace
        .fetch(&Query::all().order_by(Monster::mana().descending()))
        .expect("fetch");
    assert_eq!(names(&found), vec!["imp", "ogre"]);
    assert_eq!(found[0].hp, 9);
}

#[test]
fn deletion_removes_primary_and_index_rows() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    let stored = insert_all(
        &workspace,
        vec![Monster::new("imp", 1, 1), Monster::new("ogre", 2, 2)],
    );

    workspace
        .perform_changes(|txn| {
            let mut request = txn.deletion_request(&stored[0])?.expect("present");
            assert_eq!(request.kind(), ChangeRequestType::Deletion);
            let outcome = txn.submit(&mut request)?;
            assert_eq!(outcome, UpdatedObject::Deleted(stored[0].meta.rowid));
            assert!(txn.object::<Monster>(pk("imp"))?.is_none());
            assert!(txn.deletion_request(&stored[0])?.is_none());
            let visible = txn.fetch(&Query::<Monster>::all())?;
            assert_eq!(names(&visible), vec!["ogre"]);
            Ok(())
        })
        .expect("delete");

    assert!(workspace.object::<Monster>(pk("imp")).expect("load").is_none());
    let count: i64 = raw(dir.path())
        .query_row("SELECT COUNT(*) FROM monster__mana", [], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 1);
}

#[test]
fn turning_an_update_into_a_deletion() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    let stored = insert_all(&workspace, vec![Monster::new("imp", 1, 1)]);
    workspace
        .perform_changes(|txn| {
            let mut request = txn.change_request(&stored[0])?.expect("present");
            request.hp = 0;
            request.delete();
            assert_eq!(request.kind(), ChangeRequestType::Deletion);
            txn.submit(&mut request)
        })
        .expect("delete");
    assert!(workspace.fetch_all::<Monster>().expect("fetch").is_empty());
}

#[test]
fn unique_violation_leaves_the_transaction_usable() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    let glow = || {
        Equipment::Orb(Orb {
            name: "glow".into(),
            power: 3,
        })
    };

    workspace
        .perform_changes(|txn| {
            txn.submit(&mut ChangeRequest::creation(
                Monster::new("imp", 1, 1).with_equipment(glow()),
            ))?;
            let err = txn
                .submit(&mut ChangeRequest::creation(
                    Monster::new("ogre", 2, 2).with_equipment(glow()),
                ))
                .expect_err("duplicate orb name");
            assert!(matches!(err, AtomError::UniqueViolation { .. }));

            let err = txn
                .submit(&mut ChangeRequest::creation(Monster::new("imp", 5, 5)))
                .expect_err("duplicate primary key");
            assert_eq!(err.code_str(), "unique_violation");

            txn.submit(&mut ChangeRequest::creation(
                Monster::new("troll", 3, 3).with_equipment(Equipment::Weapon(Weapon {
                    name: "club".into(),
                    damage: 12,
                })),
            ))?;
            Ok(())
        })
        .expect("transaction survives violations");

    let found = workspace.fetch_all::<Monster>().expect("fetch");
    assert_eq!(names(&found), vec!["imp", "troll"]);
    let count: i64 = raw(dir.path())
        .query_row("SELECT COUNT(*) FROM monster__hp", [], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 2, "failed inserts left no index rows behind");
}

#[test]
fn aborting_rolls_back_everything() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    insert_all(&workspace, vec![Monster::new("imp", 1, 1)]);

    let err = workspace
        .perform_changes(|txn| {
            txn.submit(&mut ChangeRequest::creation(Monster::new("ogre", 2, 2)))?;
            txn.abort::<()>()
        })
        .expect_err("aborted");
    assert!(matches!(err, AtomError::Aborted));
    assert_eq!(names(&workspace.fetch_all::<Monster>().expect("fetch")), vec!["imp"]);
    assert_eq!(workspace.changes_timestamp(), 1);
}

#[test]
fn transaction_reads_see_in_flight_values() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    let stored = insert_all(
        &workspace,
        vec![Monster::new("imp", 10, 1), Monster::new("ogre", 20, 2)],
    );

    workspace
        .perform_changes(|txn| {
            let mut request = txn.change_request(&stored[1])?.expect("present");
            request.mana = 5;
            txn.submit(&mut request)?;

            let found = txn.fetch(&Query::all().order_by(Monster::mana().ascending()))?;
            assert_eq!(names(&found), vec!["ogre", "imp"]);
            let refined = txn.fetch(&Query::filter((Monster::mana() + Monster::hp()).lt(10)))?;
            assert_eq!(names(&refined), vec!["ogre"]);
            let loaded = txn.object::<Monster>(pk("ogre"))?.expect("present");
            assert_eq!(loaded.mana, 5);
            Ok(())
        })
        .expect("transaction");
}

#[test]
fn primary_key_changes_rekey_the_object() {
    let dir = tempdir().expect("temp");
    let workspace = open(dir.path());
    let stored = insert_all(&workspace, vec![Monster::new("imp", 1, 1)]);
    workspace
        .perform_changes(|txn| {
            let mut request = txn.change_request(&stored[0])?.expect("present");
            request.name = "archimp".into();
            txn.submit(&mut request)?;
            assert!(txn.object::<Monster>(pk("archimp"))?.is_some());
            Ok(())
        })
        .expect("rename");
    let renamed = workspace
        .object::<Monster>(ObjectKey::RowId(stored[0].meta.rowid))
        .expect("load")
        .expect("present");
    assert_eq!(renamed.name, "archimp");
    assert!(workspace.object::<Monster>(pk("imp")).expect("load").is_none());
}
