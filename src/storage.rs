use ahash::AHashSet as HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use crate::errors::Result;

/// Bound for keys of a transactional map.
///
/// Keys are opaque: the transaction layer only relies on equality and hashing.
/// `Debug` is used to name conflicting keys in errors and logs.
pub trait MapKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> MapKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Bound for values of a transactional map.
///
/// Optimistic validation compares the value pinned at capture time with the
/// current base value, hence `PartialEq`.
pub trait MapValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> MapValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// Identity of a lock holder. Transactions use their id.
pub type LockOwner = u64;

/// What a base-map lock covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockTarget<K> {
    /// The whole map. Excludes every other owner's key and map locks.
    All,
    /// A single key.
    Key(K),
}

/// Represents a single mutation to be applied to the base map.
///
/// A committing transaction hands its net effect to the base map as an
/// ordered list of `MapMutation`s: deletions first, then updates, then
/// insertions.
#[derive(Debug, Clone, PartialEq)]
pub enum MapMutation<K, V> {
    /// Insert or update the entry for the key.
    Put(K, V),
    /// Remove the entry for the key. A no-op when the key is absent.
    Remove(K),
}

/// The shared key-value store a transaction overlays.
///
/// The base map outlives every transaction working on it and is shared between
/// them, so implementations must be `Send` and `Sync`. Reads and writes are
/// plain map operations; transactional behaviour lives entirely in the
/// [`TransactionMap`](crate::transaction::TransactionMap) on top.
///
/// The lock operations are advisory: they exclude other lock holders, not
/// plain `put`/`remove` callers. Isolation only holds between parties that go
/// through the transactional layer.
pub trait BaseMap<K: MapKey, V: MapValue>: Send + Sync {
    /// Name of the map, used in error messages.
    fn name(&self) -> &str;

    /// Returns the current value for the key.
    fn get(&self, key: &K) -> Option<V>;

    /// Whether the map currently holds the key.
    fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Stores the value, returning the one it replaced.
    fn put(&self, key: K, value: V) -> Option<V>;

    /// Removes the key, returning the value it held.
    fn remove(&self, key: &K) -> Option<V>;

    /// Snapshot of every key currently in the map.
    fn key_set(&self) -> HashSet<K>;

    /// Snapshot of every entry currently in the map.
    ///
    /// The default implementation reads each key of [`key_set`](Self::key_set)
    /// separately, skipping keys removed in between. Implementations that can
    /// take a consistent snapshot should override it.
    fn entries(&self) -> Vec<(K, V)> {
        self.key_set()
            .into_iter()
            .filter_map(|key| self.get(&key).map(|value| (key, value)))
            .collect()
    }

    /// Attempts to lock `target` on behalf of `owner`, waiting at most `wait`.
    ///
    /// Returns `false` if the lock could not be obtained in time. Locking a
    /// target the owner already holds succeeds.
    fn lock(&self, owner: LockOwner, target: &LockTarget<K>, wait: Duration) -> bool;

    /// Releases a lock held by `owner`. Returns `false` if `owner` did not hold it.
    fn unlock(&self, owner: LockOwner, target: &LockTarget<K>) -> bool;

    /// Applies the mutations of a committed transaction in order.
    ///
    /// Implementations that can do so should make the whole list visible to
    /// readers at once. The default implementation applies them one by one.
    ///
    /// # Errors
    ///
    /// Returns a `TxMapError::BaseMap` if the store fails to apply them.
    fn apply_mutations(&self, mutations: Vec<MapMutation<K, V>>) -> Result<()> {
        for mutation in mutations {
            match mutation {
                MapMutation::Put(key, value) => {
                    self.put(key, value);
                }
                MapMutation::Remove(key) => {
                    self.remove(&key);
                }
            }
        }
        Ok(())
    }
}
