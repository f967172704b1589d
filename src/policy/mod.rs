//! Per-isolation-level behaviour of a transaction.
//!
//! Each level answers two questions: which accesses *enlist* a key (pin its
//! base value in the read snapshot), and what *prepare* checks before the
//! transaction may commit.

mod keyed;
mod read_committed;
mod repeatable;
mod serializable;

use crate::config::TransactionConfig;
use crate::data_store::delta_map::DeltaMap;
use crate::errors::Result;
use crate::isolation::TransactionIsolation;
use crate::storage::{MapKey, MapValue};
use crate::transaction::TransactionMap;

/// The strategy a transaction runs with, chosen once at `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationPolicy {
    /// Writes enlist; prepare validates the written keys.
    ReadCommitted,
    /// First touch enlists; prepare validates every captured key.
    RepeatableRead,
    /// As `RepeatableRead`, plus phantom detection after a full scan.
    Serializable,
}

impl IsolationPolicy {
    /// `ReadCommitted` with repeatable reads switched on behaves as
    /// `RepeatableRead`.
    pub fn for_config(config: &TransactionConfig) -> Self {
        match config.isolation {
            TransactionIsolation::ReadCommitted if config.repeatable_read => {
                IsolationPolicy::RepeatableRead
            }
            TransactionIsolation::ReadCommitted => IsolationPolicy::ReadCommitted,
            TransactionIsolation::RepeatableRead => IsolationPolicy::RepeatableRead,
            TransactionIsolation::Serializable => IsolationPolicy::Serializable,
        }
    }

    pub fn is_repeatable(self) -> bool {
        !matches!(self, IsolationPolicy::ReadCommitted)
    }

    /// Records an access to `key`. Returns `true` if the key got captured.
    pub(crate) fn enlist<K: MapKey, V: MapValue>(
        self,
        delta: &mut DeltaMap<K, V>,
        key: &K,
        write: bool,
    ) -> bool {
        match self {
            IsolationPolicy::ReadCommitted => read_committed::enlist(delta, key, write),
            IsolationPolicy::RepeatableRead => repeatable::enlist(delta, key, write),
            IsolationPolicy::Serializable => serializable::enlist(delta, key, write),
        }
    }

    /// Whether an access would capture `key`, without performing it.
    pub(crate) fn would_capture<K: MapKey, V: MapValue>(
        self,
        delta: &DeltaMap<K, V>,
        key: &K,
        write: bool,
    ) -> bool {
        (write || self.is_repeatable()) && !delta.is_captured(key)
    }

    /// Runs the prepare-time checks. The caller rolls back on error.
    pub(crate) fn prepare<K: MapKey, V: MapValue>(self, tx: &mut TransactionMap<K, V>) -> Result<()> {
        match self {
            IsolationPolicy::ReadCommitted | IsolationPolicy::RepeatableRead => keyed::prepare(tx),
            IsolationPolicy::Serializable => serializable::prepare(tx),
        }
    }
}
