use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxMapError {
    #[error("Transaction rejected by validator: {0}")]
    ValidationFailed(String),

    #[error("Concurrent modification of map '{map}': {reason}")]
    ConcurrentModification { map: String, reason: String },

    #[error("Transaction {id} exceeded its timeout of {timeout:?}")]
    TimeoutExceeded { id: u64, timeout: Duration },

    #[error("{operation} -- invalid transaction state: {state}")]
    IllegalState {
        operation: &'static str,
        state: String,
    },

    #[error("Base map error: {0}")]
    BaseMap(String),
}

impl TxMapError {
    /// Shorthand for validators vetoing a transaction.
    pub fn validation(reason: impl Into<String>) -> Self {
        TxMapError::ValidationFailed(reason.into())
    }

    pub(crate) fn concurrent_modification(map: &str, reason: impl Into<String>) -> Self {
        TxMapError::ConcurrentModification {
            map: map.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn illegal_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        TxMapError::IllegalState {
            operation,
            state: state.to_string(),
        }
    }

    /// Whether the error came from a concurrent writer or lock holder,
    /// i.e. a fresh transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TxMapError::ConcurrentModification { .. } | TxMapError::TimeoutExceeded { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TxMapError>;
