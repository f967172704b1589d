use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TransactionConfig;
use crate::conflict::validator::Validator;
use crate::errors::{Result, TxMapError};
use crate::isolation::{TransactionConcurrency, TransactionIsolation};
use crate::storage::{BaseMap, LockOwner, LockTarget, MapKey, MapValue};
use crate::transaction::{self, TransactionMap};

/// txmap Prelude
pub mod prelude {
    pub use crate::cache::{TransactionCache, TransactionStatus};
    pub use crate::config::*;
    pub use crate::conflict::detection::*;
    pub use crate::conflict::validator::*;
    pub use crate::data_store::delta_map::*;
    pub use crate::data_store::local_map::*;
    pub use crate::errors::*;
    pub use crate::isolation::*;
    pub use crate::policy::*;
    pub use crate::storage::*;
    pub use crate::transaction::*;
}

/// Status of a [`TransactionCache`], named after the JTA status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionStatus {
    #[default]
    NoTransaction,
    Active,
    Preparing,
    Prepared,
    Committing,
    Committed,
    /// Prepare failed; the transaction can only be rolled back.
    MarkedRollback,
    RollingBack,
    RolledBack,
    /// Commit failed part way; the outcome is not known to the caller.
    Unknown,
}

impl TransactionStatus {
    /// Whether a new transaction may begin from this status.
    pub fn can_begin(self) -> bool {
        matches!(
            self,
            TransactionStatus::NoTransaction
                | TransactionStatus::Committed
                | TransactionStatus::RolledBack
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::NoTransaction => "STATUS_NO_TRANSACTION",
            TransactionStatus::Active => "STATUS_ACTIVE",
            TransactionStatus::Preparing => "STATUS_PREPARING",
            TransactionStatus::Prepared => "STATUS_PREPARED",
            TransactionStatus::Committing => "STATUS_COMMITTING",
            TransactionStatus::Committed => "STATUS_COMMITTED",
            TransactionStatus::MarkedRollback => "STATUS_MARKED_ROLLBACK",
            TransactionStatus::RollingBack => "STATUS_ROLLING_BACK",
            TransactionStatus::RolledBack => "STATUS_ROLLEDBACK",
            TransactionStatus::Unknown => "STATUS_UNKNOWN",
        };
        f.write_str(name)
    }
}

/// The main entry point: a reusable handle that runs one transaction at a time
/// over a shared base map.
///
/// Settings are applied when a transaction begins; changing them while a
/// transaction runs affects the next one only. Map operations go through the
/// current transaction if there is one, and straight to the base map
/// otherwise.
///
/// Key locks taken through [`lock`](Self::lock) belong to the cache itself,
/// not to its transactions. They pair with
/// [`TransactionConcurrency::External`], where transactions leave locking to
/// the caller.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use txmap::prelude::*;
///
/// let base: Arc<dyn BaseMap<u32, String>> = Arc::new(LocalMap::<u32, String>::new("names"));
/// let mut cache = TransactionCache::new(Arc::clone(&base));
/// cache.set_isolation(TransactionIsolation::Serializable);
///
/// cache.begin().unwrap();
/// cache.put(1, "one".to_string()).unwrap();
/// cache.prepare().unwrap();
/// cache.commit().unwrap();
///
/// assert_eq!(cache.status(), TransactionStatus::Committed);
/// assert_eq!(base.get(&1), Some("one".to_string()));
/// ```
pub struct TransactionCache<K: MapKey, V: MapValue> {
    owner: LockOwner,
    base: Arc<dyn BaseMap<K, V>>,
    config: TransactionConfig,
    validator: Option<Arc<dyn Validator<K>>>,
    status: TransactionStatus,
    transaction: Option<TransactionMap<K, V>>,
}

impl<K: MapKey, V: MapValue> TransactionCache<K, V> {
    /// Creates a cache with the default configuration and no transaction.
    pub fn new(base: Arc<dyn BaseMap<K, V>>) -> Self {
        Self::with_config(base, TransactionConfig::default())
    }

    pub fn with_config(base: Arc<dyn BaseMap<K, V>>, config: TransactionConfig) -> Self {
        Self {
            owner: transaction::next_id(),
            base,
            config,
            validator: None,
            status: TransactionStatus::NoTransaction,
            transaction: None,
        }
    }

    pub fn base(&self) -> &Arc<dyn BaseMap<K, V>> {
        &self.base
    }

    /// The owner id the cache locks keys with.
    pub fn owner(&self) -> LockOwner {
        self.owner
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// The running transaction, if any.
    pub fn transaction(&self) -> Option<&TransactionMap<K, V>> {
        self.transaction.as_ref()
    }

    pub fn set_config(&mut self, config: TransactionConfig) {
        self.config = config;
    }

    pub fn set_isolation(&mut self, isolation: TransactionIsolation) {
        self.config.isolation = isolation;
    }

    pub fn set_concurrency(&mut self, concurrency: TransactionConcurrency) {
        self.config.concurrency = concurrency;
    }

    pub fn set_repeatable_read(&mut self, repeatable_read: bool) {
        self.config.repeatable_read = repeatable_read;
    }

    pub fn set_lock_wait(&mut self, wait: Duration) {
        self.config = self.config.clone().with_lock_wait(wait);
    }

    pub fn set_transaction_timeout(&mut self, timeout: Duration) {
        self.config = self.config.clone().with_transaction_timeout(timeout);
    }

    pub fn set_validator(&mut self, validator: Option<Arc<dyn Validator<K>>>) {
        self.validator = validator;
    }

    /// Starts a new transaction with the current settings.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` while a previous transaction is still undecided.
    pub fn begin(&mut self) -> Result<()> {
        if !self.status.can_begin() {
            return Err(TxMapError::illegal_state("begin", self.status));
        }
        let mut tx = TransactionMap::begin(Arc::clone(&self.base), self.config.clone());
        tx.set_validator(self.validator.clone());
        debug!("Cache on '{}' began tx {}", self.base.name(), tx.id());
        self.transaction = Some(tx);
        self.status = TransactionStatus::Active;
        Ok(())
    }

    /// Prepares the running transaction.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the status is `Active`. A prepare failure
    /// marks the cache for rollback and returns the failure.
    pub fn prepare(&mut self) -> Result<()> {
        let tx = match (&mut self.transaction, self.status) {
            (Some(tx), TransactionStatus::Active) => tx,
            _ => return Err(TxMapError::illegal_state("prepare", self.status)),
        };
        self.status = TransactionStatus::Preparing;
        match tx.prepare() {
            Ok(()) => {
                self.status = TransactionStatus::Prepared;
                Ok(())
            }
            Err(e) => {
                self.status = TransactionStatus::MarkedRollback;
                Err(e)
            }
        }
    }

    /// Commits the prepared transaction.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the status is `Prepared`. If the base map
    /// fails to apply the changes the status becomes `Unknown`.
    pub fn commit(&mut self) -> Result<()> {
        if self.status != TransactionStatus::Prepared {
            return Err(TxMapError::illegal_state("commit", self.status));
        }
        let Some(mut tx) = self.transaction.take() else {
            return Err(TxMapError::illegal_state("commit", self.status));
        };
        self.status = TransactionStatus::Committing;
        match tx.commit() {
            Ok(()) => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            Err(e) => {
                warn!("Cache on '{}' lost tx {} during commit: {}", self.base.name(), tx.id(), e);
                self.status = TransactionStatus::Unknown;
                Err(e)
            }
        }
    }

    /// Rolls back the running transaction, if any. Always succeeds.
    pub fn rollback(&mut self) {
        self.status = TransactionStatus::RollingBack;
        if let Some(mut tx) = self.transaction.take() {
            tx.rollback();
        }
        self.status = TransactionStatus::RolledBack;
    }

    pub fn get(&mut self, key: &K) -> Result<Option<V>> {
        match &mut self.transaction {
            Some(tx) => tx.get(key),
            None => Ok(self.base.get(key)),
        }
    }

    pub fn contains_key(&mut self, key: &K) -> Result<bool> {
        match &mut self.transaction {
            Some(tx) => tx.contains_key(key),
            None => Ok(self.base.contains_key(key)),
        }
    }

    pub fn get_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>) -> Result<HashMap<K, V>> {
        match &mut self.transaction {
            Some(tx) => tx.get_all(keys),
            None => Ok(keys
                .into_iter()
                .filter_map(|key| self.base.get(key).map(|value| (key.clone(), value)))
                .collect()),
        }
    }

    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        match &mut self.transaction {
            Some(tx) => tx.put(key, value),
            None => Ok(self.base.put(key, value)),
        }
    }

    pub fn put_all(&mut self, entries: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        match &mut self.transaction {
            Some(tx) => tx.put_all(entries),
            None => {
                for (key, value) in entries {
                    self.base.put(key, value);
                }
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Result<Option<V>> {
        match &mut self.transaction {
            Some(tx) => tx.remove(key),
            None => Ok(self.base.remove(key)),
        }
    }

    pub fn key_set(&mut self) -> Result<HashSet<K>> {
        match &mut self.transaction {
            Some(tx) => tx.key_set(),
            None => Ok(self.base.key_set()),
        }
    }

    pub fn entries(&mut self) -> Result<Vec<(K, V)>> {
        match &mut self.transaction {
            Some(tx) => tx.entries(),
            None => Ok(self.base.entries()),
        }
    }

    pub fn values(&mut self) -> Result<Vec<V>> {
        match &mut self.transaction {
            Some(tx) => tx.values(),
            None => Ok(self.base.entries().into_iter().map(|(_, value)| value).collect()),
        }
    }

    pub fn contains_value(&mut self, value: &V) -> Result<bool> {
        match &mut self.transaction {
            Some(tx) => tx.contains_value(value),
            None => Ok(self.base.entries().iter().any(|(_, candidate)| candidate == value)),
        }
    }

    pub fn len(&mut self) -> Result<usize> {
        match &mut self.transaction {
            Some(tx) => tx.len(),
            None => Ok(self.base.key_set().len()),
        }
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes every entry, through the running transaction if there is one.
    pub fn clear(&mut self) -> Result<()> {
        match &mut self.transaction {
            Some(tx) => tx.clear(),
            None => {
                for key in self.base.key_set() {
                    self.base.remove(&key);
                }
                Ok(())
            }
        }
    }

    /// Locks `key` on the base map for the cache, waiting at most `wait`.
    /// Returns `false` if another owner kept the lock.
    pub fn lock(&self, key: K, wait: Duration) -> bool {
        self.base.lock(self.owner, &LockTarget::Key(key), wait)
    }

    /// Releases a key lock taken with [`lock`](Self::lock).
    pub fn unlock(&self, key: K) -> bool {
        self.base.unlock(self.owner, &LockTarget::Key(key))
    }
}

impl<K: MapKey, V: MapValue> fmt::Display for TransactionCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.status, f)
    }
}
