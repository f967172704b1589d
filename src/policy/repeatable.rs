use crate::data_store::delta_map::DeltaMap;
use crate::storage::{MapKey, MapValue};

use super::read_committed;

/// The first touch of a key, read or write, is enlisted as a write so its
/// value stays pinned for the rest of the transaction. Later touches are no-ops.
pub(super) fn enlist<K: MapKey, V: MapValue>(delta: &mut DeltaMap<K, V>, key: &K, _write: bool) -> bool {
    if delta.is_captured(key) {
        return false;
    }
    read_committed::enlist(delta, key, true)
}
