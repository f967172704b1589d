use ahash::AHashSet as HashSet;
use log::debug;

use crate::data_store::delta_map::DeltaMap;
use crate::errors::Result;
use crate::isolation::TransactionConcurrency;
use crate::storage::{LockTarget, MapKey, MapValue};
use crate::transaction::TransactionMap;

use super::{keyed, repeatable};

/// Identical to repeatable read: capture on first touch.
pub(super) fn enlist<K: MapKey, V: MapValue>(delta: &mut DeltaMap<K, V>, key: &K, write: bool) -> bool {
    repeatable::enlist(delta, key, write)
}

/// A transaction that scanned the whole map locks the whole map and lets the
/// validator judge the phantom set. Anything else validates its captured keys.
pub(super) fn prepare<K: MapKey, V: MapValue>(tx: &mut TransactionMap<K, V>) -> Result<()> {
    if !tx.delta().is_fully_read() {
        return keyed::prepare(tx);
    }

    tx.check_timeout()?;

    if tx.concurrency() != TransactionConcurrency::External {
        tx.lock(LockTarget::All)?;
    }

    if tx.has_validator() {
        let phantom = phantom_set(tx.delta());
        debug!("Tx {} phantom set has {} key(s)", tx.id(), phantom.len());
        tx.run_validator(phantom)?;
    }
    Ok(())
}

/// Keys in the base map now that the scan never captured.
fn phantom_set<K: MapKey, V: MapValue>(delta: &DeltaMap<K, V>) -> HashSet<K> {
    let read = delta.read_snapshot();
    delta
        .base()
        .key_set()
        .into_iter()
        .filter(|key| !read.contains_key(key))
        .collect()
}
