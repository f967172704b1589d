use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use log::trace;
use parking_lot::{Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::errors::Result;
use crate::storage::{BaseMap, LockOwner, LockTarget, MapKey, MapMutation, MapValue};

/// Holders of the advisory locks of a [`LocalMap`].
struct LockTable<K> {
    all: Option<LockOwner>,
    keys: HashMap<K, LockOwner>,
}

impl<K: MapKey> LockTable<K> {
    fn new() -> Self {
        Self {
            all: None,
            keys: HashMap::new(),
        }
    }

    fn can_grant(&self, owner: LockOwner, target: &LockTarget<K>) -> bool {
        if self.all.is_some_and(|holder| holder != owner) {
            return false;
        }
        match target {
            LockTarget::All => self.keys.values().all(|holder| *holder == owner),
            LockTarget::Key(key) => self.keys.get(key).is_none_or(|holder| *holder == owner),
        }
    }

    fn grant(&mut self, owner: LockOwner, target: &LockTarget<K>) {
        match target {
            LockTarget::All => self.all = Some(owner),
            LockTarget::Key(key) => {
                self.keys.insert(key.clone(), owner);
            }
        }
    }

    fn release(&mut self, owner: LockOwner, target: &LockTarget<K>) -> bool {
        match target {
            LockTarget::All if self.all == Some(owner) => {
                self.all = None;
                true
            }
            LockTarget::Key(key) if self.keys.get(key) == Some(&owner) => {
                self.keys.remove(key);
                true
            }
            _ => false,
        }
    }

    fn holder(&self, target: &LockTarget<K>) -> Option<LockOwner> {
        match target {
            LockTarget::All => self.all,
            LockTarget::Key(key) => self.keys.get(key).copied(),
        }
    }
}

/// An in-memory [`BaseMap`] shared between threads.
///
/// Entries live behind a read-write lock. A batch passed to
/// [`apply_mutations`](BaseMap::apply_mutations) is applied under a single
/// write guard, so readers see either none or all of a committed transaction.
///
/// Advisory locks are kept in a separate table guarded by a mutex; waiters
/// park on a condition variable that is signalled on every release.
pub struct LocalMap<K, V> {
    name: String,
    data: RwLock<HashMap<K, V>>,
    locks: Mutex<LockTable<K>>,
    released: Condvar,
}

impl<K: MapKey, V: MapValue> LocalMap<K, V> {
    /// Creates a new, empty `LocalMap`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(HashMap::new()),
            locks: Mutex::new(LockTable::new()),
            released: Condvar::new(),
        }
    }

    /// Creates a `LocalMap` pre-populated with `entries`.
    pub fn with_entries(name: impl Into<String>, entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let map = Self::new(name);
        map.data.write().extend(entries);
        map
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns the owner currently holding `target`, if any.
    pub fn lock_holder(&self, target: &LockTarget<K>) -> Option<LockOwner> {
        self.locks.lock().holder(target)
    }

    /// Whether any owner holds `target`.
    pub fn is_locked(&self, target: &LockTarget<K>) -> bool {
        self.lock_holder(target).is_some()
    }
}

impl<K: MapKey, V: MapValue> BaseMap<K, V> for LocalMap<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &K) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.data.read().contains_key(key)
    }

    fn put(&self, key: K, value: V) -> Option<V> {
        self.data.write().insert(key, value)
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.data.write().remove(key)
    }

    fn key_set(&self) -> HashSet<K> {
        self.data.read().keys().cloned().collect()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.data
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn lock(&self, owner: LockOwner, target: &LockTarget<K>, wait: Duration) -> bool {
        // None means the wait does not fit in an Instant; treat it as unbounded.
        let deadline = Instant::now().checked_add(wait);
        let mut table = self.locks.lock();
        loop {
            if table.can_grant(owner, target) {
                table.grant(owner, target);
                trace!("Map '{}': {:?} locked by {}", self.name, target, owner);
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        trace!(
                            "Map '{}': {} timed out waiting for {:?}",
                            self.name, owner, target
                        );
                        return false;
                    }
                    self.released.wait_until(&mut table, deadline);
                }
                None => self.released.wait(&mut table),
            }
        }
    }

    fn unlock(&self, owner: LockOwner, target: &LockTarget<K>) -> bool {
        let released = self.locks.lock().release(owner, target);
        if released {
            trace!("Map '{}': {:?} unlocked by {}", self.name, target, owner);
            self.released.notify_all();
        }
        released
    }

    fn apply_mutations(&self, mutations: Vec<MapMutation<K, V>>) -> Result<()> {
        let mut data = self.data.write();
        for mutation in mutations {
            match mutation {
                MapMutation::Put(key, value) => {
                    data.insert(key, value);
                }
                MapMutation::Remove(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}
