use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use log::trace;
use std::mem;
use std::sync::Arc;

use crate::policy::IsolationPolicy;
use crate::storage::{BaseMap, MapKey, MapMutation, MapValue};

/// A private overlay of changes on top of a shared base map.
///
/// Changes are partitioned into inserted, updated and deleted keys; a key is in
/// at most one of them. Separately, the read snapshot pins the base value a key
/// had when it was first captured (`None` when the key was absent). Which
/// accesses capture a key is decided by the [`IsolationPolicy`]'s enlist hook.
///
/// Nothing reaches the base map until the owner applies
/// [`mutations`](Self::mutations).
pub struct DeltaMap<K: MapKey, V: MapValue> {
    base: Arc<dyn BaseMap<K, V>>,
    policy: IsolationPolicy,
    insert: HashMap<K, V>,
    update: HashMap<K, V>,
    delete: HashSet<K>,
    read: HashMap<K, Option<V>>,
    fully_read: bool,
}

impl<K: MapKey, V: MapValue> DeltaMap<K, V> {
    pub fn new(base: Arc<dyn BaseMap<K, V>>, policy: IsolationPolicy) -> Self {
        Self {
            base,
            policy,
            insert: HashMap::new(),
            update: HashMap::new(),
            delete: HashSet::new(),
            read: HashMap::new(),
            fully_read: false,
        }
    }

    pub fn base(&self) -> &Arc<dyn BaseMap<K, V>> {
        &self.base
    }

    pub fn policy(&self) -> IsolationPolicy {
        self.policy
    }

    /// Records an access to `key` according to the isolation policy.
    /// Returns `true` if the key was captured by this call.
    pub fn enlist(&mut self, key: &K, write: bool) -> bool {
        let policy = self.policy;
        policy.enlist(self, key, write)
    }

    /// Whether `key` already has a pinned snapshot value.
    ///
    /// After a full scan under repeatable reads every key counts as captured:
    /// keys missing from the snapshot were absent when the scan ran.
    pub fn is_captured(&self, key: &K) -> bool {
        self.read.contains_key(key) || (self.fully_read && self.policy.is_repeatable())
    }

    /// Pins the base value of `key` unless it is already captured and returns
    /// the pinned value.
    pub(crate) fn capture(&mut self, key: &K) -> Option<V> {
        if self.is_captured(key) {
            return self.pinned(key);
        }
        let value = self.base.get(key);
        trace!(
            "Captured {:?} from '{}' (present: {})",
            key,
            self.base.name(),
            value.is_some()
        );
        self.read.insert(key.clone(), value.clone());
        value
    }

    /// Captures every base entry not captured yet and marks the overlay as
    /// fully read.
    fn capture_all(&mut self) {
        if self.fully_read {
            return;
        }
        for (key, value) in self.base.entries() {
            self.read.entry(key).or_insert(Some(value));
        }
        self.fully_read = true;
    }

    fn pinned(&self, key: &K) -> Option<V> {
        self.read.get(key).cloned().flatten()
    }

    /// The transaction-local answer for `key`, if the overlay has one.
    fn local(&self, key: &K) -> Option<Option<V>> {
        if let Some(value) = self.update.get(key) {
            return Some(Some(value.clone()));
        }
        if let Some(value) = self.insert.get(key) {
            return Some(Some(value.clone()));
        }
        if self.delete.contains(key) {
            return Some(None);
        }
        None
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        if let Some(value) = self.local(key) {
            return value;
        }
        self.enlist(key, false);
        if self.policy.is_repeatable() && self.is_captured(key) {
            self.pinned(key)
        } else {
            self.base.get(key)
        }
    }

    pub fn contains_key(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn get_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>) -> HashMap<K, V> {
        keys.into_iter()
            .filter_map(|key| self.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Stores `value` for `key` in the overlay and returns the previously
    /// visible value.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.enlist(&key, true);
        let was_deleted = self.delete.remove(&key);

        if let Some(slot) = self.update.get_mut(&key) {
            return Some(mem::replace(slot, value));
        }
        if let Some(slot) = self.insert.get_mut(&key) {
            return Some(mem::replace(slot, value));
        }

        let original = self.pinned(&key);
        let previous = if was_deleted { None } else { original.clone() };
        if original.is_some() {
            self.update.insert(key, value);
        } else {
            self.insert.insert(key, value);
        }
        previous
    }

    pub fn put_all(&mut self, entries: impl IntoIterator<Item = (K, V)>) {
        for (key, value) in entries {
            self.put(key, value);
        }
    }

    /// Removes `key` from the overlay's view and returns the previously visible
    /// value. Removing a key inserted by this overlay simply discards the insert.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.enlist(key, true);
        if let Some(value) = self.insert.remove(key) {
            // Without repeatable reads the capture only guarded the write.
            if !self.policy.is_repeatable() {
                self.read.remove(key);
            }
            return Some(value);
        }
        if self.delete.contains(key) {
            return None;
        }
        let previous = self.update.remove(key).or_else(|| self.pinned(key));
        self.delete.insert(key.clone());
        previous
    }

    /// Deletes every visible key.
    pub fn clear(&mut self) {
        let mut keys: HashSet<K> = if self.policy.is_repeatable() {
            self.capture_all();
            self.read
                .iter()
                .filter(|(_, value)| value.is_some())
                .map(|(key, _)| key.clone())
                .collect()
        } else {
            self.base.key_set()
        };
        keys.extend(self.update.keys().cloned());
        keys.retain(|key| !self.insert.contains_key(key));

        for key in &keys {
            self.enlist(key, true);
        }
        if !self.policy.is_repeatable() {
            for key in self.insert.keys() {
                self.read.remove(key);
            }
        }
        self.insert.clear();
        self.update.clear();
        self.delete.extend(keys);
    }

    /// The map as this overlay sees it.
    ///
    /// Under repeatable reads this is a full scan: every base entry gets
    /// captured and the overlay becomes fully read.
    fn resolved(&mut self) -> HashMap<K, V> {
        let mut view: HashMap<K, V> = if self.policy.is_repeatable() {
            self.capture_all();
            self.read
                .iter()
                .filter_map(|(key, value)| value.as_ref().map(|value| (key.clone(), value.clone())))
                .collect()
        } else {
            self.base.entries().into_iter().collect()
        };
        for key in &self.delete {
            view.remove(key);
        }
        view.extend(self.update.iter().map(|(k, v)| (k.clone(), v.clone())));
        view.extend(self.insert.iter().map(|(k, v)| (k.clone(), v.clone())));
        view
    }

    pub fn key_set(&mut self) -> HashSet<K> {
        self.resolved().into_iter().map(|(key, _)| key).collect()
    }

    pub fn entries(&mut self) -> Vec<(K, V)> {
        self.resolved().into_iter().collect()
    }

    pub fn len(&mut self) -> usize {
        self.resolved().len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Records that the overlay's reads cover the whole map, as a query layer
    /// does after an unindexed scan. Under repeatable reads this captures
    /// every base entry, exactly like [`key_set`](Self::key_set).
    pub fn mark_fully_read(&mut self) {
        if self.policy.is_repeatable() {
            self.capture_all();
        } else {
            self.fully_read = true;
        }
    }

    pub fn is_fully_read(&self) -> bool {
        self.fully_read
    }

    pub fn is_modified(&self, key: &K) -> bool {
        self.insert.contains_key(key) || self.update.contains_key(key) || self.delete.contains(key)
    }

    pub fn is_read(&self, key: &K) -> bool {
        self.is_modified(key) || self.read.contains_key(key)
    }

    pub fn insert_key_set(&self) -> HashSet<K> {
        self.insert.keys().cloned().collect()
    }

    pub fn update_key_set(&self) -> HashSet<K> {
        self.update.keys().cloned().collect()
    }

    pub fn delete_key_set(&self) -> HashSet<K> {
        self.delete.clone()
    }

    /// Every captured key, modified or not.
    pub fn read_key_set(&self) -> HashSet<K> {
        self.read.keys().cloned().collect()
    }

    /// The pinned snapshot: key to the base value at capture time.
    pub fn read_snapshot(&self) -> &HashMap<K, Option<V>> {
        &self.read
    }

    pub fn has_changes(&self) -> bool {
        !(self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty())
    }

    /// The net effect of the overlay: deletions, then updates, then insertions.
    pub fn mutations(&self) -> Vec<MapMutation<K, V>> {
        let mut mutations =
            Vec::with_capacity(self.delete.len() + self.update.len() + self.insert.len());
        mutations.extend(self.delete.iter().cloned().map(MapMutation::Remove));
        mutations.extend(
            self.update
                .iter()
                .map(|(key, value)| MapMutation::Put(key.clone(), value.clone())),
        );
        mutations.extend(
            self.insert
                .iter()
                .map(|(key, value)| MapMutation::Put(key.clone(), value.clone())),
        );
        mutations
    }

    /// Discards every change and the read snapshot.
    pub fn reset(&mut self) {
        self.insert.clear();
        self.update.clear();
        self.delete.clear();
        self.read.clear();
        self.fully_read = false;
    }
}
