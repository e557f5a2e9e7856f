//! Error surface of the lock coordination layer.

use granlock_types::{LockType, ResourceName, TxnId};
use thiserror::Error;

/// Errors raised by the lock table and the hierarchical lock contexts.
///
/// Every variant is terminal for the failed call: a mutating operation either
/// fully completes or leaves all state unchanged, and any retry policy
/// belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The request would break a multigranularity invariant: bad parent
    /// lock, descendant locks still held, invalid promotion target, or a
    /// redundant SIX below an existing SIX.
    #[error("hierarchy violation on {resource} for {txn}: {reason}")]
    HierarchyViolation {
        txn: TxnId,
        resource: ResourceName,
        reason: &'static str,
    },

    /// The transaction already holds the lock being requested.
    #[error("{txn} already holds {held} on {resource}")]
    DuplicateLock {
        txn: TxnId,
        resource: ResourceName,
        held: LockType,
    },

    /// An operation requiring an existing lock found none.
    #[error("{txn} holds no lock on {resource}")]
    NoLockHeld { txn: TxnId, resource: ResourceName },

    /// A mutating operation was attempted on a readonly context.
    #[error("lock context {resource} is readonly")]
    ReadonlyContext { resource: ResourceName },

    /// The requested grant is incompatible with a lock held by another
    /// transaction. The table fails fast rather than queueing the request.
    #[error("{txn} requested {requested} on {resource} but {holder} holds {held}")]
    Conflict {
        txn: TxnId,
        resource: ResourceName,
        requested: LockType,
        holder: TxnId,
        held: LockType,
    },
}
