/// This module contains the transaction-local overlay of changes.
pub mod delta_map;
/// This module contains the in-memory shared base map.
pub mod local_map;
