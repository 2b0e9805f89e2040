//! Staging writes take part in the surrounding transaction.

use graft_db::connection::{Connection, ConnectionPool, Fault, MemoryEngine, Statement};
use graft_db::staging::{StagingKey, StagingStore, TableStagingStore};
use serde_json::json;

fn prepared() -> (MemoryEngine, TableStagingStore, Box<dyn Connection>) {
    let engine = MemoryEngine::new();
    let store = TableStagingStore::default();
    let mut conn = engine.pool().acquire().unwrap();
    store.ensure(conn.as_mut()).unwrap();
    (engine, store, conn)
}

#[test]
fn test_staged_entries_vanish_on_rollback() {
    let (engine, store, mut conn) = prepared();
    let key = StagingKey::for_batch("graft_abc", "Person", 0).unwrap();

    conn.execute(&Statement::begin()).unwrap();
    store.put(conn.as_mut(), &key, &json!([{"id": "p1"}])).unwrap();
    assert_eq!(store.get(conn.as_mut(), &key).unwrap(), json!([{"id": "p1"}]));
    conn.execute(&Statement::rollback()).unwrap();

    assert!(engine.staged_keys().is_empty());
    assert_eq!(store.get(conn.as_mut(), &key).unwrap(), json!([]));
}

#[test]
fn test_staged_entries_survive_commit() {
    let (engine, store, mut conn) = prepared();
    let key = StagingKey::for_batch("graft_abc", "Person", 0).unwrap();

    conn.execute(&Statement::begin()).unwrap();
    store.put(conn.as_mut(), &key, &json!([{"id": "p1"}])).unwrap();
    conn.execute(&Statement::commit()).unwrap();

    assert_eq!(engine.staged_value(key.as_str()), Some(json!([{"id": "p1"}])));
}

#[test]
fn test_injected_staging_failure_surfaces_key() {
    let (engine, store, mut conn) = prepared();
    engine.inject(Fault::statement_containing("INSERT INTO graft_staging").with_message("disk full"));
    let key = StagingKey::new("graft_abc_Person_0").unwrap();

    let err = store.put(conn.as_mut(), &key, &json!([])).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Staging entry `graft_abc_Person_0`: disk full"
    );
}

#[test]
fn test_delete_prefix_only_touches_one_load() {
    let (engine, store, mut conn) = prepared();
    for name in ["graft_one_A_0", "graft_one_B_0", "graft_two_A_0"] {
        let key = StagingKey::new(name).unwrap();
        store.put(conn.as_mut(), &key, &json!([])).unwrap();
    }

    assert_eq!(store.delete_prefix(conn.as_mut(), "graft_one_").unwrap(), 2);
    assert_eq!(engine.staged_keys(), vec!["graft_two_A_0".to_string()]);
}
