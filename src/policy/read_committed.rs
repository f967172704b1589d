use crate::data_store::delta_map::DeltaMap;
use crate::storage::{MapKey, MapValue};

/// Writes capture the key so prepare can detect lost updates; reads go
/// straight to the base map and record nothing.
pub(super) fn enlist<K: MapKey, V: MapValue>(delta: &mut DeltaMap<K, V>, key: &K, write: bool) -> bool {
    if !write || delta.is_captured(key) {
        return false;
    }
    delta.capture(key);
    true
}
