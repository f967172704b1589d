pub mod cache;
pub mod config;
pub mod conflict;
pub mod data_store;
pub mod errors;
pub mod isolation;
pub mod locking;
pub mod policy;
pub mod storage;
pub mod transaction;

// Re-export key types and structs for easier access
pub use cache::{TransactionCache, TransactionStatus, prelude};
pub use config::TransactionConfig;
pub use conflict::detection::ConflictType;
pub use conflict::validator::{ChangeSets, RejectPhantoms, Validator};
pub use data_store::delta_map::DeltaMap;
pub use data_store::local_map::LocalMap;
pub use errors::{Result, TxMapError};
pub use isolation::{TransactionConcurrency, TransactionIsolation};
pub use policy::IsolationPolicy;
pub use storage::{BaseMap, LockOwner, LockTarget, MapKey, MapMutation, MapValue};
pub use transaction::{TransactionInfo, TransactionMap, TransactionState};
