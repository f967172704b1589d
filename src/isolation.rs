use serde::{Deserialize, Serialize};
use std::fmt;

/// Defines the isolation levels supported by a [`TransactionMap`](crate::TransactionMap).
///
/// The level is fixed when a transaction begins. It decides which accesses pin
/// a key's value for the rest of the transaction (see
/// [`enlist`](crate::policy)) and how much is validated at prepare time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionIsolation {
    /// **Read Committed:**
    ///
    /// Every read goes to the base map, so the same key may show different
    /// committed values within one transaction. Only written keys are pinned,
    /// which lets prepare detect lost updates on them.
    ReadCommitted,
    /// **Repeatable Read:**
    ///
    /// The first access to a key, read or write, pins its value for the rest
    /// of the transaction. Concurrent commits to that key are invisible to the
    /// transaction and cause it to fail validation. New keys inserted by
    /// others (phantoms) are not detected.
    RepeatableRead,
    /// **Serializable:**
    ///
    /// Reads behave as in `RepeatableRead`. A transaction that scanned the
    /// whole map additionally locks the map at prepare time and hands the
    /// phantom set (keys that appeared since the scan) to the validator.
    Serializable,
}

impl TransactionIsolation {
    /// Whether reads pin values at this level.
    pub fn is_repeatable(self) -> bool {
        !matches!(self, TransactionIsolation::ReadCommitted)
    }
}

impl fmt::Display for TransactionIsolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionIsolation::ReadCommitted => "READ_COMMITTED",
            TransactionIsolation::RepeatableRead => "REPEATABLE_READ",
            TransactionIsolation::Serializable => "SERIALIZABLE",
        };
        f.write_str(name)
    }
}

/// How a transaction coordinates with other transactions through base-map locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransactionConcurrency {
    /// Locks are taken at prepare time, followed by validation of every
    /// captured key.
    #[default]
    Optimistic,
    /// A key is locked when the transaction first captures it. An access that
    /// cannot get its lock within the lock wait fails with
    /// `ConcurrentModification`, but unlike a failed prepare it leaves the
    /// transaction `Active` so the caller may retry the access or roll back.
    /// Lock failures during prepare still roll back.
    Pessimistic,
    /// Optimistic validation, but the caller owns the locking: prepare never
    /// acquires base-map locks.
    External,
}

impl fmt::Display for TransactionConcurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionConcurrency::Optimistic => "OPTIMISTIC",
            TransactionConcurrency::Pessimistic => "PESSIMISTIC",
            TransactionConcurrency::External => "EXTERNAL",
        };
        f.write_str(name)
    }
}
