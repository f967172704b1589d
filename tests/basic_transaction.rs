mod common;

use std::sync::Arc;

use txmap::prelude::*;

use common::{FailingMap, accounts, key, keys, shared};

#[test]
fn test_transaction_ids_are_unique() {
    let map = accounts(&[]);
    let tx1 = TransactionMap::begin(shared(&map), TransactionConfig::default());
    let tx2 = TransactionMap::begin(shared(&map), TransactionConfig::default());

    assert!(tx2.id() > tx1.id());
    assert_eq!(tx1.state(), TransactionState::Active);
    assert_eq!(tx1.isolation(), TransactionIsolation::ReadCommitted);
    assert_eq!(tx1.concurrency(), TransactionConcurrency::Optimistic);
}

#[test]
fn test_put_commit_publishes_changes() {
    let map = accounts(&[]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    assert_eq!(tx.put(key("alice"), 100).unwrap(), None);
    // Nothing reaches the base map before commit.
    assert_eq!(map.get(&key("alice")), None);

    tx.commit().unwrap();
    assert_eq!(tx.state(), TransactionState::Committed);
    assert_eq!(map.get(&key("alice")), Some(100));
}

#[test]
fn test_reads_see_own_writes() {
    let map = accounts(&[("alice", 100)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::read_committed());

    tx.put(key("bob"), 50).unwrap();
    assert_eq!(tx.get(&key("bob")).unwrap(), Some(50));
    assert!(tx.contains_key(&key("bob")).unwrap());

    tx.remove(&key("alice")).unwrap();
    assert_eq!(tx.get(&key("alice")).unwrap(), None);
    assert!(!tx.contains_key(&key("alice")).unwrap());

    // The base map is untouched.
    assert_eq!(map.get(&key("alice")), Some(100));
    assert_eq!(map.get(&key("bob")), None);
}

#[test]
fn test_put_returns_previous_value_and_classifies_update() {
    let map = accounts(&[("alice", 100)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    assert_eq!(tx.put(key("alice"), 200).unwrap(), Some(100));
    assert_eq!(tx.put(key("alice"), 300).unwrap(), Some(200));

    assert_eq!(tx.update_set(), keys(&["alice"]));
    assert!(tx.insert_set().is_empty());
    assert!(tx.delete_set().is_empty());
}

#[test]
fn test_remove_of_own_insert_leaves_no_trace() {
    let map = accounts(&[]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    tx.put(key("carol"), 10).unwrap();
    assert_eq!(tx.insert_set(), keys(&["carol"]));
    assert_eq!(tx.remove(&key("carol")).unwrap(), Some(10));

    assert!(tx.insert_set().is_empty());
    assert!(tx.delete_set().is_empty());
    tx.commit().unwrap();
    assert!(map.is_empty());
}

#[test]
fn test_remove_then_put_becomes_update() {
    let map = accounts(&[("alice", 100)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    assert_eq!(tx.remove(&key("alice")).unwrap(), Some(100));
    assert_eq!(tx.delete_set(), keys(&["alice"]));
    assert_eq!(tx.put(key("alice"), 7).unwrap(), None);

    assert!(tx.delete_set().is_empty());
    assert_eq!(tx.update_set(), keys(&["alice"]));
    tx.commit().unwrap();
    assert_eq!(map.get(&key("alice")), Some(7));
}

#[test]
fn test_remove_commit_deletes_from_base() {
    let map = accounts(&[("alice", 100), ("bob", 50)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    assert_eq!(tx.remove(&key("alice")).unwrap(), Some(100));
    assert_eq!(tx.remove(&key("alice")).unwrap(), None);
    tx.commit().unwrap();

    assert_eq!(map.get(&key("alice")), None);
    assert_eq!(map.get(&key("bob")), Some(50));
}

#[test]
fn test_bulk_operations() {
    let map = accounts(&[("alice", 100), ("bob", 50)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    tx.put_all(vec![(key("carol"), 1), (key("dave"), 2)]).unwrap();
    let found = tx
        .get_all(&[key("alice"), key("carol"), key("nobody")])
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found.get(&key("alice")), Some(&100));
    assert_eq!(found.get(&key("carol")), Some(&1));
}

#[test]
fn test_scans_merge_overlay_with_base() {
    let map = accounts(&[("alice", 100), ("bob", 50)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    tx.put(key("carol"), 1).unwrap();
    tx.put(key("bob"), 51).unwrap();
    tx.remove(&key("alice")).unwrap();

    assert_eq!(tx.key_set().unwrap(), keys(&["bob", "carol"]));
    assert_eq!(tx.len().unwrap(), 2);
    assert!(!tx.is_empty().unwrap());

    let mut entries = tx.entries().unwrap();
    entries.sort();
    assert_eq!(entries, vec![(key("bob"), 51), (key("carol"), 1)]);
}

#[test]
fn test_clear_deletes_every_visible_key() {
    let map = accounts(&[("alice", 100), ("bob", 50)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    tx.put(key("carol"), 1).unwrap();
    tx.clear().unwrap();

    assert!(tx.is_empty().unwrap());
    assert_eq!(tx.delete_set(), keys(&["alice", "bob"]));
    assert!(tx.insert_set().is_empty());

    tx.commit().unwrap();
    assert!(map.is_empty());
}

#[test]
fn test_rollback_discards_changes() {
    let map = accounts(&[("alice", 100)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    tx.put(key("alice"), 0).unwrap();
    tx.put(key("bob"), 1).unwrap();
    tx.rollback();

    assert_eq!(tx.state(), TransactionState::RolledBack);
    assert!(tx.update_set().is_empty());
    assert!(tx.read_set().is_empty());
    assert_eq!(map.get(&key("alice")), Some(100));
    assert_eq!(map.get(&key("bob")), None);

    // A second rollback is a no-op.
    tx.rollback();
    assert_eq!(tx.state(), TransactionState::RolledBack);
}

#[test]
fn test_operations_rejected_outside_active_state() {
    let map = accounts(&[("alice", 100)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());
    tx.rollback();

    let result = tx.get(&key("alice"));
    assert!(matches!(
        result,
        Err(TxMapError::IllegalState { operation: "get", .. })
    ));
    assert!(matches!(
        tx.put(key("alice"), 1),
        Err(TxMapError::IllegalState { .. })
    ));
    assert!(matches!(tx.commit(), Err(TxMapError::IllegalState { .. })));
    assert!(matches!(tx.prepare(), Err(TxMapError::IllegalState { .. })));
}

#[test]
fn test_prepare_then_commit() {
    let map = accounts(&[("alice", 100)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    tx.put(key("alice"), 150).unwrap();
    tx.prepare().unwrap();
    assert_eq!(tx.state(), TransactionState::Prepared);
    assert_eq!(tx.held_locks(), vec![LockTarget::Key(key("alice"))]);
    assert!(map.is_locked(&LockTarget::Key(key("alice"))));

    // The transaction is frozen once prepared.
    assert!(matches!(
        tx.put(key("alice"), 1),
        Err(TxMapError::IllegalState { operation: "put", .. })
    ));

    tx.commit().unwrap();
    assert_eq!(map.get(&key("alice")), Some(150));
    assert!(!map.is_locked(&LockTarget::Key(key("alice"))));
    assert!(tx.held_locks().is_empty());

    assert!(matches!(tx.commit(), Err(TxMapError::IllegalState { .. })));
    // Rolling back a committed transaction changes nothing.
    tx.rollback();
    assert_eq!(tx.state(), TransactionState::Committed);
}

#[test]
fn test_rollback_after_prepare_releases_locks() {
    let map = accounts(&[("alice", 100)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    tx.get(&key("alice")).unwrap();
    tx.prepare().unwrap();
    assert!(map.is_locked(&LockTarget::Key(key("alice"))));

    tx.rollback();
    assert!(!map.is_locked(&LockTarget::Key(key("alice"))));
    assert_eq!(map.get(&key("alice")), Some(100));
}

#[test]
fn test_drop_rolls_back_prepared_transaction() {
    let map = accounts(&[("alice", 100)]);
    {
        let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());
        tx.put(key("alice"), 0).unwrap();
        tx.prepare().unwrap();
        assert!(map.is_locked(&LockTarget::Key(key("alice"))));
    }
    assert!(!map.is_locked(&LockTarget::Key(key("alice"))));
    assert_eq!(map.get(&key("alice")), Some(100));
}

#[test]
fn test_commit_failure_in_base_map_rolls_back() {
    let failing = Arc::new(FailingMap::new(&[("alice", 100)]));
    let base: Arc<dyn BaseMap<String, i64>> = failing.clone();
    let mut tx = TransactionMap::begin(base, TransactionConfig::repeatable_read());

    tx.put(key("alice"), 1).unwrap();
    let result = tx.commit();

    assert!(matches!(result, Err(TxMapError::BaseMap(_))));
    assert_eq!(tx.state(), TransactionState::RolledBack);
    assert!(!failing.is_locked(&LockTarget::Key(key("alice"))));
    assert_eq!(failing.get(&key("alice")), Some(100));
}

#[test]
fn test_delta_map_mutations_are_ordered() {
    let map = accounts(&[("alice", 100), ("bob", 50)]);
    let mut delta = DeltaMap::new(shared(&map), IsolationPolicy::RepeatableRead);

    delta.put(key("carol"), 1);
    delta.put(key("bob"), 51);
    delta.remove(&key("alice"));

    assert!(delta.has_changes());
    assert!(delta.is_modified(&key("bob")));
    assert!(delta.is_read(&key("alice")));
    assert!(!delta.is_read(&key("nobody")));
    assert_eq!(
        delta.mutations(),
        vec![
            MapMutation::Remove(key("alice")),
            MapMutation::Put(key("bob"), 51),
            MapMutation::Put(key("carol"), 1),
        ]
    );

    delta.reset();
    assert!(!delta.has_changes());
    assert!(!delta.is_read(&key("alice")));
    assert!(delta.read_snapshot().is_empty());
}

#[test]
fn test_key_sets_stay_disjoint() {
    let map = accounts(&[("alice", 100), ("bob", 50)]);
    let mut tx = TransactionMap::begin(shared(&map), TransactionConfig::repeatable_read());

    tx.put(key("alice"), 1).unwrap();
    tx.remove(&key("alice")).unwrap();
    tx.put(key("carol"), 2).unwrap();
    tx.remove(&key("bob")).unwrap();
    tx.put(key("bob"), 3).unwrap();
    tx.remove(&key("dave")).unwrap();

    let inserted = tx.insert_set();
    let updated = tx.update_set();
    let deleted = tx.delete_set();
    assert!(inserted.is_disjoint(&updated));
    assert!(inserted.is_disjoint(&deleted));
    assert!(updated.is_disjoint(&deleted));
    assert_eq!(deleted, keys(&["alice", "dave"]));
}
