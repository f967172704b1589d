use ahash::AHashMap as HashMap;
use std::fmt::Write;

use crate::data_store::delta_map::DeltaMap;
use crate::storage::{MapKey, MapValue};

/// Represents the type of conflict detected for a captured key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// Another transaction committed a different value for the key.
    Updated,
    /// The key was present when captured and has since been removed.
    Deleted,
    /// The key was absent when captured and has since been inserted.
    Inserted,
}

/// Compares every captured key's pinned value with the current base value.
///
/// This is the optimistic validation step: a transaction may only commit if
/// nothing it captured has changed underneath it. Returns the conflicting keys
/// and how each one changed; an empty map means the transaction is valid.
pub fn detect_conflicts<K: MapKey, V: MapValue>(delta: &DeltaMap<K, V>) -> HashMap<K, ConflictType> {
    let base = delta.base();
    let mut conflicts = HashMap::new();

    for (key, pinned) in delta.read_snapshot() {
        let current = base.get(key);
        let conflict = match (pinned, current) {
            (Some(pinned), Some(current)) if *pinned != current => Some(ConflictType::Updated),
            (Some(_), None) => Some(ConflictType::Deleted),
            (None, Some(_)) => Some(ConflictType::Inserted),
            _ => None,
        };
        if let Some(conflict) = conflict {
            conflicts.insert(key.clone(), conflict);
        }
    }

    conflicts
}

/// Renders conflicts for an error message, e.g. `"k1" updated, "k2" deleted`.
pub fn describe_conflicts<K: MapKey>(conflicts: &HashMap<K, ConflictType>) -> String {
    let mut description = String::new();
    for (index, (key, conflict)) in conflicts.iter().enumerate() {
        if index > 0 {
            description.push_str(", ");
        }
        let kind = match conflict {
            ConflictType::Updated => "updated",
            ConflictType::Deleted => "deleted",
            ConflictType::Inserted => "inserted",
        };
        // Writing to a String cannot fail.
        let _ = write!(description, "{:?} {}", key, kind);
    }
    description
}
