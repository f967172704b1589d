use ahash::AHashSet as HashSet;

use crate::errors::{Result, TxMapError};
use crate::storage::MapKey;
use crate::transaction::TransactionInfo;

/// The key sets a validator judges a transaction by.
#[derive(Debug, Clone)]
pub struct ChangeSets<K> {
    /// Keys created by the transaction.
    pub inserted: HashSet<K>,
    /// Pre-existing keys the transaction modified.
    pub updated: HashSet<K>,
    /// Keys the transaction removed.
    pub deleted: HashSet<K>,
    /// Every key the transaction captured.
    pub read: HashSet<K>,
    /// Keys present in the base map at validation time that the transaction
    /// never captured despite having scanned the whole map. Always empty for
    /// transactions that did not scan.
    pub phantom: HashSet<K>,
}

impl<K: MapKey> ChangeSets<K> {
    /// Whether the transaction wrote anything.
    pub fn has_writes(&self) -> bool {
        !(self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty())
    }
}

/// Caller-supplied conflict check run during prepare.
///
/// Returning an error vetoes the commit: the transaction is rolled back and the
/// error is handed back to the caller unchanged. Any `Fn(&TransactionInfo,
/// &ChangeSets<K>) -> Result<()>` closure is a validator.
pub trait Validator<K>: Send + Sync {
    fn validate(&self, transaction: &TransactionInfo, changes: &ChangeSets<K>) -> Result<()>;
}

impl<K, F> Validator<K> for F
where
    F: Fn(&TransactionInfo, &ChangeSets<K>) -> Result<()> + Send + Sync,
{
    fn validate(&self, transaction: &TransactionInfo, changes: &ChangeSets<K>) -> Result<()> {
        self(transaction, changes)
    }
}

/// Rejects any transaction whose phantom set is not empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectPhantoms;

impl<K: MapKey> Validator<K> for RejectPhantoms {
    fn validate(&self, transaction: &TransactionInfo, changes: &ChangeSets<K>) -> Result<()> {
        if changes.phantom.is_empty() {
            Ok(())
        } else {
            Err(TxMapError::validation(format!(
                "transaction {} observed phantom keys {:?}",
                transaction.id, changes.phantom
            )))
        }
    }
}
