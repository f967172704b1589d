use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::TransactionConfig;
use crate::conflict::validator::{ChangeSets, Validator};
use crate::data_store::delta_map::DeltaMap;
use crate::errors::{Result, TxMapError};
use crate::isolation::{TransactionConcurrency, TransactionIsolation};
use crate::locking::{Deadline, LockTokens};
use crate::policy::IsolationPolicy;
use crate::storage::{BaseMap, LockTarget, MapKey, MapValue};

/// Source of transaction ids. Ids double as lock owners on the base map.
static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Hands out a fresh transaction id, also usable as a lock owner.
pub(crate) fn next_id() -> u64 {
    NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst)
}

/// Lifecycle stage of a [`TransactionMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Reads and writes are accepted.
    Active,
    /// Prepare-time checks are running.
    Preparing,
    /// Validation passed; locks taken during prepare are still held.
    Prepared,
    /// The changes have been applied to the base map.
    Committed,
    /// The changes were discarded.
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Active => "ACTIVE",
            TransactionState::Preparing => "PREPARING",
            TransactionState::Prepared => "PREPARED",
            TransactionState::Committed => "COMMITTED",
            TransactionState::RolledBack => "ROLLED_BACK",
        };
        f.write_str(name)
    }
}

/// What a validator learns about the transaction it judges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionInfo {
    pub id: u64,
    pub isolation: TransactionIsolation,
    pub concurrency: TransactionConcurrency,
    pub state: TransactionState,
}

/// A single-use transaction over a shared [`BaseMap`].
///
/// Reads and writes go to a private [`DeltaMap`]; nothing is visible to other
/// parties until [`commit`](Self::commit). The lifecycle is
/// `Active → Preparing → Prepared → Committed`, with
/// [`rollback`](Self::rollback) legal from any non-terminal state. A failed
/// prepare rolls the transaction back before returning the error, so the
/// caller never has to clean up locks. Dropping a transaction that has not
/// finished rolls it back.
///
/// A transaction is driven by one caller at a time; different transactions
/// may run on different threads against the same base map.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use txmap::prelude::*;
///
/// let base: Arc<dyn BaseMap<String, i64>> = Arc::new(LocalMap::<String, i64>::new("accounts"));
///
/// let mut tx = TransactionMap::begin(Arc::clone(&base), TransactionConfig::repeatable_read());
/// tx.put("alice".to_string(), 100).unwrap();
/// tx.commit().unwrap();
///
/// assert_eq!(base.get(&"alice".to_string()), Some(100));
/// assert_eq!(tx.state(), TransactionState::Committed);
/// ```
pub struct TransactionMap<K: MapKey, V: MapValue> {
    id: u64,
    config: TransactionConfig,
    state: TransactionState,
    delta: DeltaMap<K, V>,
    locks: LockTokens<K>,
    deadline: Deadline,
    validator: Option<Arc<dyn Validator<K>>>,
}

impl<K: MapKey, V: MapValue> TransactionMap<K, V> {
    /// Begins a new transaction over `base`.
    ///
    /// The transaction timeout, if any, starts counting now.
    pub fn begin(base: Arc<dyn BaseMap<K, V>>, config: TransactionConfig) -> Self {
        let id = next_id();
        let policy = IsolationPolicy::for_config(&config);
        debug!(
            "Tx {} began on '{}' ({}, {})",
            id,
            base.name(),
            config.isolation,
            config.concurrency
        );
        Self {
            id,
            deadline: Deadline::start(config.transaction_timeout()),
            config,
            state: TransactionState::Active,
            delta: DeltaMap::new(base, policy),
            locks: LockTokens::new(id),
            validator: None,
        }
    }

    /// Begins a new transaction whose prepare consults `validator`.
    pub fn begin_with_validator(
        base: Arc<dyn BaseMap<K, V>>,
        config: TransactionConfig,
        validator: Arc<dyn Validator<K>>,
    ) -> Self {
        let mut tx = Self::begin(base, config);
        tx.validator = Some(validator);
        tx
    }

    /// Sets the validator run during prepare.
    pub fn with_validator(mut self, validator: impl Validator<K> + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Replaces the validator; `None` means every transaction is valid.
    pub fn set_validator(&mut self, validator: Option<Arc<dyn Validator<K>>>) {
        self.validator = validator;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn isolation(&self) -> TransactionIsolation {
        self.config.isolation
    }

    pub fn concurrency(&self) -> TransactionConcurrency {
        self.config.concurrency
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    pub fn policy(&self) -> IsolationPolicy {
        self.delta.policy()
    }

    pub fn info(&self) -> TransactionInfo {
        TransactionInfo {
            id: self.id,
            isolation: self.config.isolation,
            concurrency: self.config.concurrency,
            state: self.state,
        }
    }

    /// The transaction-local overlay.
    pub fn delta(&self) -> &DeltaMap<K, V> {
        &self.delta
    }

    pub fn insert_set(&self) -> HashSet<K> {
        self.delta.insert_key_set()
    }

    pub fn update_set(&self) -> HashSet<K> {
        self.delta.update_key_set()
    }

    pub fn delete_set(&self) -> HashSet<K> {
        self.delta.delete_key_set()
    }

    pub fn read_set(&self) -> HashSet<K> {
        self.delta.read_key_set()
    }

    pub fn is_fully_read(&self) -> bool {
        self.delta.is_fully_read()
    }

    /// Base-map locks currently held by this transaction.
    pub fn held_locks(&self) -> Vec<LockTarget<K>> {
        self.locks.held().cloned().collect()
    }

    fn ensure_active(&self, operation: &'static str) -> Result<()> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(TxMapError::illegal_state(operation, self.state))
        }
    }

    /// Under pessimistic concurrency, locks `key` before it gets captured.
    fn lock_on_capture(&mut self, key: &K, write: bool) -> Result<()> {
        if self.config.concurrency != TransactionConcurrency::Pessimistic
            || !self.delta.policy().would_capture(&self.delta, key, write)
        {
            return Ok(());
        }
        self.check_timeout_or_rollback()?;
        self.lock(LockTarget::Key(key.clone()))
    }

    /// Under pessimistic concurrency, locks the whole map before an access
    /// that captures every entry.
    fn lock_on_scan(&mut self, write: bool) -> Result<()> {
        if self.config.concurrency != TransactionConcurrency::Pessimistic {
            return Ok(());
        }
        let captures = write || (self.delta.policy().is_repeatable() && !self.delta.is_fully_read());
        if !captures {
            return Ok(());
        }
        self.check_timeout_or_rollback()?;
        self.lock(LockTarget::All)
    }

    fn check_timeout_or_rollback(&mut self) -> Result<()> {
        if let Err(e) = self.check_timeout() {
            self.rollback();
            return Err(e);
        }
        Ok(())
    }

    pub fn get(&mut self, key: &K) -> Result<Option<V>> {
        self.ensure_active("get")?;
        self.lock_on_capture(key, false)?;
        Ok(self.delta.get(key))
    }

    pub fn contains_key(&mut self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn get_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>) -> Result<HashMap<K, V>> {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Stages `value` for `key`, returning the previously visible value.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.ensure_active("put")?;
        self.lock_on_capture(&key, true)?;
        Ok(self.delta.put(key, value))
    }

    pub fn put_all(&mut self, entries: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Stages the removal of `key`, returning the previously visible value.
    pub fn remove(&mut self, key: &K) -> Result<Option<V>> {
        self.ensure_active("remove")?;
        self.lock_on_capture(key, true)?;
        Ok(self.delta.remove(key))
    }

    /// Stages the removal of every visible key.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_active("clear")?;
        self.lock_on_scan(true)?;
        self.delta.clear();
        Ok(())
    }

    /// Every visible key. Under repeatable reads this is a full scan.
    pub fn key_set(&mut self) -> Result<HashSet<K>> {
        self.ensure_active("key_set")?;
        self.lock_on_scan(false)?;
        Ok(self.delta.key_set())
    }

    /// Every visible entry. Under repeatable reads this is a full scan.
    pub fn entries(&mut self) -> Result<Vec<(K, V)>> {
        self.ensure_active("entries")?;
        self.lock_on_scan(false)?;
        Ok(self.delta.entries())
    }

    /// Every visible value. Under repeatable reads this is a full scan.
    pub fn values(&mut self) -> Result<Vec<V>> {
        Ok(self.entries()?.into_iter().map(|(_, value)| value).collect())
    }

    pub fn contains_value(&mut self, value: &V) -> Result<bool> {
        Ok(self.entries()?.iter().any(|(_, candidate)| candidate == value))
    }

    pub fn len(&mut self) -> Result<usize> {
        self.ensure_active("len")?;
        self.lock_on_scan(false)?;
        Ok(self.delta.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Declares that this transaction's reads are not reducible to the keys
    /// it touched, e.g. after an unindexed query.
    pub fn mark_fully_read(&mut self) -> Result<()> {
        self.ensure_active("mark_fully_read")?;
        self.lock_on_scan(false)?;
        self.delta.mark_fully_read();
        Ok(())
    }

    /// Validates the transaction according to its isolation policy.
    ///
    /// On success the transaction is `Prepared` and keeps whatever locks
    /// prepare took until commit or rollback.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the transaction is `Active`. Any other
    /// error (timeout, lock failure, conflicting keys, validator veto) rolls the
    /// transaction back before it is returned.
    pub fn prepare(&mut self) -> Result<()> {
        self.ensure_active("prepare")?;
        self.state = TransactionState::Preparing;

        let policy = self.delta.policy();
        match policy.prepare(self) {
            Ok(()) => {
                self.state = TransactionState::Prepared;
                debug!("Tx {} prepared, holding {} lock(s)", self.id, self.locks.len());
                Ok(())
            }
            Err(e) => {
                debug!("Tx {} failed to prepare: {}", self.id, e);
                self.rollback();
                Err(e)
            }
        }
    }

    /// Applies the changes to the base map: deletions, then updates, then
    /// insertions, in a single `apply_mutations` call. Releases every lock
    /// afterwards. An `Active` transaction is prepared first.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` for a transaction that is neither `Active` nor
    /// `Prepared`, any prepare error, or the base map's error if it failed to
    /// apply the changes. In every error case other than `IllegalState` the
    /// transaction ends rolled back with its locks released.
    pub fn commit(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Active => self.prepare()?,
            TransactionState::Prepared => {}
            state => return Err(TxMapError::illegal_state("commit", state)),
        }

        let mutations = self.delta.mutations();
        let count = mutations.len();
        let result = if mutations.is_empty() {
            Ok(())
        } else {
            self.delta.base().apply_mutations(mutations)
        };

        self.release_locks();
        self.delta.reset();

        match result {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!("Tx {} committed {} mutation(s)", self.id, count);
                Ok(())
            }
            Err(e) => {
                warn!("Tx {} failed to apply its changes: {}", self.id, e);
                self.state = TransactionState::RolledBack;
                Err(e)
            }
        }
    }

    /// Discards every change and releases every lock.
    ///
    /// Rolling back a committed or already rolled back transaction does nothing.
    pub fn rollback(&mut self) {
        if self.state.is_terminal() {
            debug!("Tx {} already {}, nothing to roll back", self.id, self.state);
            return;
        }
        let released = self.release_locks();
        self.delta.reset();
        self.state = TransactionState::RolledBack;
        debug!("Tx {} rolled back, released {} lock(s)", self.id, released);
    }

    fn release_locks(&mut self) -> usize {
        let base = Arc::clone(self.delta.base());
        self.locks.release_all(base.as_ref())
    }

    /// Fails with `TimeoutExceeded` once the transaction outlived its timeout.
    pub(crate) fn check_timeout(&self) -> Result<()> {
        self.deadline.check(self.id)
    }

    /// Locks `target` on the base map within the configured lock wait.
    pub(crate) fn lock(&mut self, target: LockTarget<K>) -> Result<()> {
        let wait = self.deadline.clamp(self.config.lock_wait());
        let base = Arc::clone(self.delta.base());
        if self.locks.acquire(base.as_ref(), target.clone(), wait) {
            return Ok(());
        }
        let what = match &target {
            LockTarget::All => "the map".to_string(),
            LockTarget::Key(key) => format!("key {:?}", key),
        };
        Err(TxMapError::concurrent_modification(
            base.name(),
            format!("transaction {} could not lock {} within {:?}", self.id, what, wait),
        ))
    }

    pub(crate) fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Hands the transaction's key sets and `phantom` to the validator, if any.
    pub(crate) fn run_validator(&self, phantom: HashSet<K>) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let changes = ChangeSets {
            inserted: self.delta.insert_key_set(),
            updated: self.delta.update_key_set(),
            deleted: self.delta.delete_key_set(),
            read: self.delta.read_key_set(),
            phantom,
        };
        validator.validate(&self.info(), &changes)
    }
}

impl<K: MapKey, V: MapValue> Drop for TransactionMap<K, V> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            debug!("Tx {} dropped while {}", self.id, self.state);
            self.rollback();
        }
    }
}

impl<K: MapKey, V: MapValue> fmt::Debug for TransactionMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionMap")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("isolation", &self.config.isolation)
            .field("concurrency", &self.config.concurrency)
            .field("map", &self.delta.base().name())
            .finish()
    }
}
