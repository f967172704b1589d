//! Common utilities for txmap integration tests.
#![allow(dead_code)]

use ahash::AHashSet as HashSet;
use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use txmap::prelude::*;

// --- Maps ---

/// Creates a shared account map pre-populated with `entries`.
pub fn accounts(entries: &[(&str, i64)]) -> Arc<LocalMap<String, i64>> {
    Arc::new(LocalMap::with_entries(
        "accounts",
        entries.iter().map(|(k, v)| (k.to_string(), *v)),
    ))
}

/// Views a local map as the trait object transactions work on.
pub fn shared<K: MapKey, V: MapValue>(map: &Arc<LocalMap<K, V>>) -> Arc<dyn BaseMap<K, V>> {
    map.clone()
}

pub fn key(name: &str) -> String {
    name.to_string()
}

pub fn keys(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Commits `key = value` from a separate read-committed transaction.
pub fn commit_put(base: &Arc<dyn BaseMap<String, i64>>, name: &str, value: i64) {
    let mut tx = TransactionMap::begin(Arc::clone(base), TransactionConfig::read_committed());
    tx.put(key(name), value).unwrap();
    tx.commit().unwrap();
}

/// Commits the removal of `key` from a separate read-committed transaction.
pub fn commit_remove(base: &Arc<dyn BaseMap<String, i64>>, name: &str) {
    let mut tx = TransactionMap::begin(Arc::clone(base), TransactionConfig::read_committed());
    tx.remove(&key(name)).unwrap();
    tx.commit().unwrap();
}

pub fn pessimistic(config: TransactionConfig, lock_wait: Duration) -> TransactionConfig {
    config
        .with_concurrency(TransactionConcurrency::Pessimistic)
        .with_lock_wait(lock_wait)
}

// --- FailingMap ---

/// A base map that serves reads and locks but refuses to apply commits.
pub struct FailingMap {
    inner: LocalMap<String, i64>,
}

impl FailingMap {
    pub fn new(entries: &[(&str, i64)]) -> Self {
        Self {
            inner: LocalMap::with_entries("failing", entries.iter().map(|(k, v)| (k.to_string(), *v))),
        }
    }

    pub fn is_locked(&self, target: &LockTarget<String>) -> bool {
        self.inner.is_locked(target)
    }
}

impl BaseMap<String, i64> for FailingMap {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get(&self, key: &String) -> Option<i64> {
        self.inner.get(key)
    }

    fn put(&self, key: String, value: i64) -> Option<i64> {
        self.inner.put(key, value)
    }

    fn remove(&self, key: &String) -> Option<i64> {
        self.inner.remove(key)
    }

    fn key_set(&self) -> HashSet<String> {
        self.inner.key_set()
    }

    fn lock(&self, owner: LockOwner, target: &LockTarget<String>, wait: Duration) -> bool {
        self.inner.lock(owner, target, wait)
    }

    fn unlock(&self, owner: LockOwner, target: &LockTarget<String>) -> bool {
        self.inner.unlock(owner, target)
    }

    fn apply_mutations(&self, _mutations: Vec<MapMutation<String, i64>>) -> Result<()> {
        Err(TxMapError::BaseMap("disk full".to_string()))
    }
}

// --- RecordingValidator ---

/// A validator that remembers every call and optionally vetoes non-empty
/// phantom sets.
pub struct RecordingValidator<K> {
    calls: Mutex<Vec<(TransactionInfo, ChangeSets<K>)>>,
    reject_phantoms: bool,
}

impl<K: MapKey> RecordingValidator<K> {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reject_phantoms: false,
        })
    }

    pub fn rejecting_phantoms() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reject_phantoms: true,
        })
    }

    pub fn calls(&self) -> Vec<(TransactionInfo, ChangeSets<K>)> {
        self.calls.lock().clone()
    }

    pub fn last(&self) -> Option<ChangeSets<K>> {
        self.calls.lock().last().map(|(_, changes)| changes.clone())
    }
}

impl<K: MapKey> Validator<K> for RecordingValidator<K> {
    fn validate(&self, transaction: &TransactionInfo, changes: &ChangeSets<K>) -> Result<()> {
        self.calls.lock().push((*transaction, changes.clone()));
        if self.reject_phantoms && !changes.phantom.is_empty() {
            return Err(TxMapError::validation(format!(
                "{} phantom key(s)",
                changes.phantom.len()
            )));
        }
        Ok(())
    }
}

/// Upcasts a recording validator for `set_validator`.
pub fn as_validator<K: MapKey>(validator: &Arc<RecordingValidator<K>>) -> Arc<dyn Validator<K>> {
    validator.clone()
}

// --- Arrow values ---

/// Helper function to create a simple schema.
pub fn create_test_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("value", DataType::Utf8, true),
    ]))
}

/// Helper function to create a RecordBatch.
pub fn create_record_batch(ids: Vec<i64>, values: Vec<Option<&str>>) -> RecordBatch {
    let schema = create_test_schema();
    RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(values)),
        ],
    )
    .unwrap()
}
