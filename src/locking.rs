//! Base-map lock bookkeeping and transaction deadlines.

use ahash::AHashSet as HashSet;
use log::{trace, warn};
use std::time::{Duration, Instant};

use crate::errors::{Result, TxMapError};
use crate::storage::{BaseMap, LockOwner, LockTarget, MapKey, MapValue};

/// The base-map locks held by one transaction.
///
/// Every target is acquired at most once and released exactly once, whatever
/// mix of prepare, commit and rollback paths runs.
#[derive(Debug)]
pub struct LockTokens<K> {
    owner: LockOwner,
    held: HashSet<LockTarget<K>>,
}

impl<K: MapKey> LockTokens<K> {
    pub fn new(owner: LockOwner) -> Self {
        Self {
            owner,
            held: HashSet::new(),
        }
    }

    /// Locks `target` unless it is already held. Returns `false` if the base
    /// map did not grant it within `wait`.
    pub fn acquire<V: MapValue>(
        &mut self,
        base: &dyn BaseMap<K, V>,
        target: LockTarget<K>,
        wait: Duration,
    ) -> bool {
        if self.held.contains(&target) {
            return true;
        }
        if base.lock(self.owner, &target, wait) {
            trace!("Tx {} acquired {:?}", self.owner, target);
            self.held.insert(target);
            true
        } else {
            false
        }
    }

    /// Releases everything held. Returns how many locks were released.
    pub fn release_all<V: MapValue>(&mut self, base: &dyn BaseMap<K, V>) -> usize {
        let count = self.held.len();
        for target in self.held.drain() {
            if !base.unlock(self.owner, &target) {
                warn!(
                    "Tx {} held {:?} on map '{}' but the map did not release it",
                    self.owner,
                    target,
                    base.name()
                );
            }
        }
        count
    }

    pub fn held(&self) -> impl Iterator<Item = &LockTarget<K>> {
        self.held.iter()
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// The point after which a transaction is considered expired.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    timeout: Option<Duration>,
}

impl Deadline {
    /// Starts counting now. `None` never expires.
    pub fn start(timeout: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.timeout
            .map(|timeout| timeout.saturating_sub(self.started.elapsed()))
    }

    pub fn is_expired(&self) -> bool {
        self.timeout
            .is_some_and(|timeout| self.started.elapsed() >= timeout)
    }

    /// Shortens a lock wait so it does not outlive the transaction.
    pub fn clamp(&self, wait: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => wait.min(remaining),
            None => wait,
        }
    }

    /// Fails once the transaction has outlived its timeout.
    ///
    /// # Errors
    ///
    /// Returns `TxMapError::TimeoutExceeded` for transaction `id`.
    pub fn check(&self, id: u64) -> Result<()> {
        match self.timeout {
            Some(timeout) if self.is_expired() => {
                Err(TxMapError::TimeoutExceeded { id, timeout })
            }
            _ => Ok(()),
        }
    }
}
