//! Single-resource lock grant table.
//!
//! The [`LockTable`] grants, releases and promotes locks one named resource
//! at a time. It knows nothing about the hierarchy: cross-level invariants
//! are enforced by [`LockContext`] before any call lands here. What the
//! table does guarantee is atomicity — every mutating entry point runs under
//! one mutex over the grant state, which is what makes
//! [`LockTable::acquire_and_release`] indivisible across its whole release
//! set with respect to other transactions.
//!
//! Incompatible requests fail fast with [`LockError::Conflict`]; there are no
//! wait queues and no deadlock detection in this layer.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use granlock_types::{LockType, ResourceName, TxnId};

use crate::context::LockContext;
use crate::error::LockError;

// ---------------------------------------------------------------------------
// Lock / Grant
// ---------------------------------------------------------------------------

/// A lock held by one transaction on one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub name: ResourceName,
    pub lock_type: LockType,
    pub txn: TxnId,
}

/// Per-resource view of a grant. Most resources carry one or two grants at a
/// time, hence the inline capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Grant {
    txn: TxnId,
    lock_type: LockType,
}

type GrantList = SmallVec<[Grant; 2]>;

// ---------------------------------------------------------------------------
// TableState
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TableState {
    /// Granted locks per resource. Entries are dropped once empty.
    grants: HashMap<ResourceName, GrantList>,
    /// Locks held per transaction, in acquisition order.
    held: HashMap<TxnId, Vec<Lock>>,
    /// Count of successful mutating calls, for observability and tests.
    mutations: u64,
}

impl TableState {
    fn lock_type_of(&self, txn: TxnId, name: &ResourceName) -> LockType {
        self.grants
            .get(name)
            .and_then(|grants| grants.iter().find(|g| g.txn == txn))
            .map_or(LockType::NL, |g| g.lock_type)
    }

    /// Reject `requested` if it conflicts with any other transaction's grant
    /// on `name`.
    fn check_compatible(
        &self,
        txn: TxnId,
        name: &ResourceName,
        requested: LockType,
    ) -> Result<(), LockError> {
        if let Some(grants) = self.grants.get(name) {
            for grant in grants {
                if grant.txn != txn && !grant.lock_type.compatible(requested) {
                    return Err(LockError::Conflict {
                        txn,
                        resource: name.clone(),
                        requested,
                        holder: grant.txn,
                        held: grant.lock_type,
                    });
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, txn: TxnId, name: &ResourceName, lock_type: LockType) {
        self.grants
            .entry(name.clone())
            .or_default()
            .push(Grant { txn, lock_type });
        self.held.entry(txn).or_default().push(Lock {
            name: name.clone(),
            lock_type,
            txn,
        });
    }

    fn remove(&mut self, txn: TxnId, name: &ResourceName) {
        if let Some(grants) = self.grants.get_mut(name) {
            grants.retain(|g| g.txn != txn);
            if grants.is_empty() {
                self.grants.remove(name);
            }
        }
        if let Some(held) = self.held.get_mut(&txn) {
            held.retain(|l| l.name != *name);
        }
    }

    /// Change the type of an existing grant in place, preserving its
    /// position in the transaction's acquisition order.
    fn set_type(&mut self, txn: TxnId, name: &ResourceName, lock_type: LockType) {
        if let Some(grant) = self
            .grants
            .get_mut(name)
            .and_then(|grants| grants.iter_mut().find(|g| g.txn == txn))
        {
            grant.lock_type = lock_type;
        }
        if let Some(lock) = self
            .held
            .get_mut(&txn)
            .and_then(|held| held.iter_mut().find(|l| l.name == *name))
        {
            lock.lock_type = lock_type;
        }
    }
}

// ---------------------------------------------------------------------------
// LockTable
// ---------------------------------------------------------------------------

/// The raw per-resource grant table plus the registry of root-level
/// hierarchical contexts.
///
/// Callers normally go through [`LockContext`] (obtained via
/// [`LockTable::context`]) rather than calling the table directly, so that
/// multigranularity invariants are enforced.
pub struct LockTable {
    state: Mutex<TableState>,
    /// Root-level contexts, one per top-level path segment. Contexts are
    /// never destroyed; they live as long as the table.
    roots: Mutex<HashMap<String, Arc<LockContext>>>,
}

impl LockTable {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TableState::default()),
            roots: Mutex::new(HashMap::new()),
        })
    }

    /// Grant a new `lock_type` lock on `name` to `txn`.
    ///
    /// Fails with [`LockError::DuplicateLock`] if `txn` already holds a lock
    /// on `name`, and with [`LockError::Conflict`] if the grant is
    /// incompatible with another transaction's lock.
    pub fn acquire(
        &self,
        txn: TxnId,
        name: &ResourceName,
        lock_type: LockType,
    ) -> Result<(), LockError> {
        if lock_type == LockType::NL {
            return Err(LockError::HierarchyViolation {
                txn,
                resource: name.clone(),
                reason: "NL is the absence of a lock and cannot be acquired",
            });
        }
        let mut state = self.state.lock();
        let held = state.lock_type_of(txn, name);
        if held != LockType::NL {
            return Err(LockError::DuplicateLock {
                txn,
                resource: name.clone(),
                held,
            });
        }
        state.check_compatible(txn, name, lock_type)?;
        state.insert(txn, name, lock_type);
        state.mutations += 1;
        drop(state);
        tracing::debug!(txn = %txn, resource = %name, lock_type = %lock_type, "lock acquired");
        Ok(())
    }

    /// Release `txn`'s lock on `name`.
    pub fn release(&self, txn: TxnId, name: &ResourceName) -> Result<(), LockError> {
        let mut state = self.state.lock();
        if state.lock_type_of(txn, name) == LockType::NL {
            return Err(LockError::NoLockHeld {
                txn,
                resource: name.clone(),
            });
        }
        state.remove(txn, name);
        state.mutations += 1;
        drop(state);
        tracing::debug!(txn = %txn, resource = %name, "lock released");
        Ok(())
    }

    /// Atomically change `txn`'s existing lock on `name` to `new_type`.
    ///
    /// Valid only when `new_type` is substitutable for the held type and
    /// differs from it.
    pub fn promote(
        &self,
        txn: TxnId,
        name: &ResourceName,
        new_type: LockType,
    ) -> Result<(), LockError> {
        if new_type == LockType::NL {
            return Err(LockError::HierarchyViolation {
                txn,
                resource: name.clone(),
                reason: "cannot promote to NL",
            });
        }
        let mut state = self.state.lock();
        let held = state.lock_type_of(txn, name);
        if held == LockType::NL {
            return Err(LockError::NoLockHeld {
                txn,
                resource: name.clone(),
            });
        }
        if held == new_type {
            return Err(LockError::DuplicateLock {
                txn,
                resource: name.clone(),
                held,
            });
        }
        if !new_type.substitutable_for(held) {
            return Err(LockError::HierarchyViolation {
                txn,
                resource: name.clone(),
                reason: "requested type is not a promotion of the held lock",
            });
        }
        state.check_compatible(txn, name, new_type)?;
        state.set_type(txn, name, new_type);
        state.mutations += 1;
        drop(state);
        tracing::debug!(txn = %txn, resource = %name, new_type = %new_type, "lock promoted");
        Ok(())
    }

    /// Atomically grant `lock_type` on `name` while releasing every resource
    /// in `release`, as one indivisible operation with respect to other
    /// transactions.
    ///
    /// `release` may contain `name` itself when the transaction's existing
    /// lock there is being replaced. Every entry must currently be held by
    /// `txn`; validation completes before any state changes, so a failure
    /// leaves the table untouched.
    pub fn acquire_and_release(
        &self,
        txn: TxnId,
        name: &ResourceName,
        lock_type: LockType,
        release: &[ResourceName],
    ) -> Result<(), LockError> {
        if lock_type == LockType::NL {
            return Err(LockError::HierarchyViolation {
                txn,
                resource: name.clone(),
                reason: "NL is the absence of a lock and cannot be acquired",
            });
        }
        let mut state = self.state.lock();
        let held = state.lock_type_of(txn, name);
        let releases_self = release.iter().any(|r| r == name);
        if held != LockType::NL && !releases_self {
            return Err(LockError::DuplicateLock {
                txn,
                resource: name.clone(),
                held,
            });
        }
        for resource in release {
            if state.lock_type_of(txn, resource) == LockType::NL {
                return Err(LockError::NoLockHeld {
                    txn,
                    resource: resource.clone(),
                });
            }
        }
        state.check_compatible(txn, name, lock_type)?;

        for resource in release {
            if resource != name {
                state.remove(txn, resource);
            }
        }
        if releases_self {
            // Replace in place so the lock keeps its acquisition-order slot.
            state.set_type(txn, name, lock_type);
        } else {
            state.insert(txn, name, lock_type);
        }
        state.mutations += 1;
        drop(state);
        tracing::debug!(
            txn = %txn,
            resource = %name,
            lock_type = %lock_type,
            released = release.len(),
            "lock acquired with combined release"
        );
        Ok(())
    }

    /// Type of the lock `txn` holds on `name`, `NL` if none.
    #[must_use]
    pub fn get_lock_type(&self, txn: TxnId, name: &ResourceName) -> LockType {
        self.state.lock().lock_type_of(txn, name)
    }

    /// All locks currently held by `txn`, in acquisition order.
    #[must_use]
    pub fn get_locks(&self, txn: TxnId) -> Vec<Lock> {
        self.state
            .lock()
            .held
            .get(&txn)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of grants across all resources.
    #[must_use]
    pub fn lock_count(&self) -> usize {
        self.state.lock().grants.values().map(SmallVec::len).sum()
    }

    /// Number of successful mutating calls since creation.
    #[must_use]
    pub fn mutation_count(&self) -> u64 {
        self.state.lock().mutations
    }

    /// Root-level hierarchical context for a top-level path segment,
    /// creating it on first access.
    pub fn context(self: &Arc<Self>, segment: impl Into<String>) -> Arc<LockContext> {
        let segment = segment.into();
        let mut roots = self.roots.lock();
        if let Some(root) = roots.get(&segment) {
            return Arc::clone(root);
        }
        let root = LockContext::new_root(Arc::clone(self), segment.clone());
        roots.insert(segment, Arc::clone(&root));
        root
    }

    /// Context for a fully qualified resource name, descending one segment
    /// at a time from the root registry.
    pub fn context_for(self: &Arc<Self>, name: &ResourceName) -> Arc<LockContext> {
        let (first, rest) = name
            .segments()
            .split_first()
            .expect("resource name is never empty");
        let mut ctx = self.context(first.clone());
        for segment in rest {
            ctx = ctx.child_context(segment.clone());
        }
        ctx
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LockTable")
            .field("resources", &state.grants.len())
            .field("mutations", &state.mutations)
            .finish_non_exhaustive()
    }
}
