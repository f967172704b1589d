use ahash::AHashSet as HashSet;
use log::debug;

use crate::conflict::detection::{describe_conflicts, detect_conflicts};
use crate::errors::{Result, TxMapError};
use crate::isolation::TransactionConcurrency;
use crate::storage::{LockTarget, MapKey, MapValue};
use crate::transaction::TransactionMap;

/// Prepare for transactions whose reads are bounded to the keys they captured.
///
/// Locks every captured key (unless locking is external), then checks that no
/// captured key changed since it was pinned, then runs the validator with an
/// empty phantom set.
pub(super) fn prepare<K: MapKey, V: MapValue>(tx: &mut TransactionMap<K, V>) -> Result<()> {
    tx.check_timeout()?;

    if tx.concurrency() != TransactionConcurrency::External {
        let keys: Vec<K> = tx.delta().read_snapshot().keys().cloned().collect();
        for key in keys {
            tx.lock(LockTarget::Key(key))?;
        }
    }

    let conflicts = detect_conflicts(tx.delta());
    if !conflicts.is_empty() {
        debug!(
            "Tx {} failed validation: {} conflicting key(s)",
            tx.id(),
            conflicts.len()
        );
        return Err(TxMapError::concurrent_modification(
            tx.delta().base().name(),
            format!("conflicting keys: {}", describe_conflicts(&conflicts)),
        ));
    }

    tx.run_validator(HashSet::new())
}
