use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::isolation::{TransactionConcurrency, TransactionIsolation};

/// Settings a transaction is created with.
///
/// Zero for `lock_wait_millis` means a single lock attempt without waiting;
/// zero for `transaction_timeout_millis` means the transaction never expires.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionConfig {
    pub isolation: TransactionIsolation,
    pub concurrency: TransactionConcurrency,
    pub repeatable_read: bool,
    pub lock_wait_millis: u64,
    pub transaction_timeout_millis: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self::new(TransactionIsolation::ReadCommitted)
    }
}

impl TransactionConfig {
    /// Optimistic, no lock wait, no timeout; repeatable reads follow `isolation`.
    pub fn new(isolation: TransactionIsolation) -> Self {
        Self {
            isolation,
            concurrency: TransactionConcurrency::Optimistic,
            repeatable_read: isolation.is_repeatable(),
            lock_wait_millis: 0,
            transaction_timeout_millis: 0,
        }
    }

    pub fn read_committed() -> Self {
        Self::new(TransactionIsolation::ReadCommitted)
    }

    pub fn repeatable_read() -> Self {
        Self::new(TransactionIsolation::RepeatableRead)
    }

    pub fn serializable() -> Self {
        Self::new(TransactionIsolation::Serializable)
    }

    pub fn with_concurrency(mut self, concurrency: TransactionConcurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Enables repeatable reads under `ReadCommitted`. Has no effect on the
    /// other levels, which always read repeatably.
    pub fn with_repeatable_read(mut self, repeatable_read: bool) -> Self {
        self.repeatable_read = repeatable_read;
        self
    }

    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait_millis = wait.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout_millis = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_millis)
    }

    /// The transaction lifetime, `None` when unbounded.
    pub fn transaction_timeout(&self) -> Option<Duration> {
        (self.transaction_timeout_millis > 0)
            .then(|| Duration::from_millis(self.transaction_timeout_millis))
    }

    /// Whether first reads pin values for the rest of the transaction.
    pub fn is_repeatable_read(&self) -> bool {
        self.repeatable_read || self.isolation.is_repeatable()
    }
}
