//! Hierarchical lock contexts.
//!
//! A [`LockContext`] wraps the raw [`LockTable`] with the structure of
//! multigranularity locking: one context per resource name, forming a tree
//! that is materialized lazily as resources are addressed. Each context
//! validates cross-level invariants (top-down acquisition, bottom-up
//! release, SIX exclusivity) before delegating the actual grant or release
//! to the table, and tracks how many descendant locks each transaction holds
//! so that release and escalation decisions never require a hierarchy scan.
//!
//! Contexts are never destroyed; once a resource name has been addressed its
//! context lives for the lifetime of the table.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use granlock_types::{LockType, ResourceName, TxnId};

use crate::error::LockError;
use crate::table::{Lock, LockTable};

/// One node of the lock hierarchy.
pub struct LockContext {
    table: Arc<LockTable>,
    /// Non-owning back-reference; `None` (dead weak) at the root.
    parent: Weak<LockContext>,
    name: ResourceName,
    /// Set at construction; a readonly context rejects every mutation.
    readonly: bool,
    /// Once set, every child materialized afterwards is permanently
    /// readonly. Children that already exist are unaffected.
    child_locks_disabled: AtomicBool,
    /// Children by path segment, materialized exactly once per segment.
    children: Mutex<HashMap<String, Arc<LockContext>>>,
    /// Per-transaction count of locks held strictly below this node.
    /// Entries are created lazily and never removed.
    num_child_locks: Mutex<HashMap<TxnId, u64>>,
}

impl LockContext {
    pub(crate) fn new_root(table: Arc<LockTable>, segment: String) -> Arc<Self> {
        Arc::new(Self {
            table,
            parent: Weak::new(),
            name: ResourceName::root(segment),
            readonly: false,
            child_locks_disabled: AtomicBool::new(false),
            children: Mutex::new(HashMap::new()),
            num_child_locks: Mutex::new(HashMap::new()),
        })
    }

    fn new_child(parent: &Arc<Self>, segment: String, readonly: bool) -> Arc<Self> {
        Arc::new(Self {
            table: Arc::clone(&parent.table),
            parent: Arc::downgrade(parent),
            name: parent.name.child(segment),
            readonly,
            child_locks_disabled: AtomicBool::new(readonly),
            children: Mutex::new(HashMap::new()),
            num_child_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Name of the resource this context guards.
    #[must_use]
    pub fn resource_name(&self) -> &ResourceName {
        &self.name
    }

    /// Parent context, or `None` at the top of the hierarchy.
    #[must_use]
    pub fn parent_context(&self) -> Option<Arc<LockContext>> {
        self.parent.upgrade()
    }

    /// Whether mutating operations are forbidden on this context.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Context for the child reached through `segment`, created on first
    /// access. Concurrent first accesses agree on a single instance. The
    /// child is readonly if this context is, or if child locking has been
    /// disabled here.
    pub fn child_context(self: &Arc<Self>, segment: impl Into<String>) -> Arc<LockContext> {
        let segment = segment.into();
        let mut children = self.children.lock();
        if let Some(child) = children.get(&segment) {
            return Arc::clone(child);
        }
        let readonly = self.readonly || self.child_locks_disabled.load(Ordering::Acquire);
        let child = Self::new_child(self, segment.clone(), readonly);
        children.insert(segment, Arc::clone(&child));
        child
    }

    /// Forbid locking below this node: every child context materialized from
    /// now on is readonly. Idempotent. Used below indexes and temporary
    /// tables, where finer-grained locks are never wanted.
    pub fn disable_child_locks(&self) {
        self.child_locks_disabled.store(true, Ordering::Release);
    }

    /// Number of locks `txn` holds on resources strictly below this node.
    #[must_use]
    pub fn get_num_children(&self, txn: TxnId) -> u64 {
        self.num_child_locks.lock().get(&txn).copied().unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Mutating operations
    // -----------------------------------------------------------------------

    /// Acquire a `lock_type` lock on this resource for `txn`.
    ///
    /// The parent's *effective* lock must permit `lock_type` beneath it
    /// (top-down acquisition). On success the descendant counts of every
    /// ancestor grow by one.
    pub fn acquire(&self, txn: TxnId, lock_type: LockType) -> Result<(), LockError> {
        if self.readonly {
            return Err(LockError::ReadonlyContext {
                resource: self.name.clone(),
            });
        }
        if let Some(parent) = self.parent.upgrade() {
            if !parent
                .get_effective_lock_type(txn)
                .can_be_parent_of(lock_type)
            {
                return Err(LockError::HierarchyViolation {
                    txn,
                    resource: self.name.clone(),
                    reason: "parent lock does not permit this request",
                });
            }
        }
        self.table.acquire(txn, &self.name, lock_type)?;
        if let Some(parent) = self.parent.upgrade() {
            parent.update_chain(txn, 1);
        }
        Ok(())
    }

    /// Release `txn`'s lock on this resource.
    ///
    /// Rejected while `txn` still holds any lock below this node: releasing
    /// a coarse lock first would silently revoke the access its descendants'
    /// locks imply (bottom-up release).
    pub fn release(&self, txn: TxnId) -> Result<(), LockError> {
        if self.readonly {
            return Err(LockError::ReadonlyContext {
                resource: self.name.clone(),
            });
        }
        if self.get_num_children(txn) != 0 {
            return Err(LockError::HierarchyViolation {
                txn,
                resource: self.name.clone(),
                reason: "descendant locks are still held",
            });
        }
        self.table.release(txn, &self.name)?;
        if let Some(parent) = self.parent.upgrade() {
            parent.update_chain(txn, -1);
        }
        Ok(())
    }

    /// Promote `txn`'s lock here to `new_type`.
    ///
    /// Promotion to SIX sweeps up the redundant S/IS locks below: they are
    /// released in the same atomic table call that grants the SIX, and the
    /// descendant counts of their ancestors shrink accordingly. Any other
    /// target delegates to the table's promote after the parent check.
    pub fn promote(self: &Arc<Self>, txn: TxnId, new_type: LockType) -> Result<(), LockError> {
        if self.readonly {
            return Err(LockError::ReadonlyContext {
                resource: self.name.clone(),
            });
        }
        if let Some(parent) = self.parent.upgrade() {
            if !parent
                .get_effective_lock_type(txn)
                .can_be_parent_of(new_type)
            {
                return Err(LockError::HierarchyViolation {
                    txn,
                    resource: self.name.clone(),
                    reason: "parent lock does not permit this promotion",
                });
            }
        }
        if new_type != LockType::SIX {
            return self.table.promote(txn, &self.name, new_type);
        }

        let current = self.get_explicit_lock_type(txn);
        if current == LockType::NL {
            return Err(LockError::NoLockHeld {
                txn,
                resource: self.name.clone(),
            });
        }
        if current == LockType::SIX {
            return Err(LockError::DuplicateLock {
                txn,
                resource: self.name.clone(),
                held: current,
            });
        }
        if self.has_six_ancestor(txn) {
            return Err(LockError::HierarchyViolation {
                txn,
                resource: self.name.clone(),
                reason: "an ancestor already holds SIX",
            });
        }
        if !LockType::SIX.substitutable_for(current) {
            return Err(LockError::HierarchyViolation {
                txn,
                resource: self.name.clone(),
                reason: "SIX is not a promotion of the held lock",
            });
        }

        let mut release_set = self.sis_descendants(txn);
        release_set.push(self.name.clone());
        self.table
            .acquire_and_release(txn, &self.name, LockType::SIX, &release_set)?;
        self.settle_released(txn, &release_set);
        tracing::debug!(txn = %txn, resource = %self.name, from = %current, "lock promoted to SIX");
        Ok(())
    }

    /// Replace this node's lock and every descendant lock `txn` holds with a
    /// single lock here, choosing the weakest type that preserves every
    /// guarantee the finer locks provided (S when only S/IS is held below,
    /// X otherwise).
    ///
    /// Issues at most one mutating call to the table; a context already in
    /// escalated form (explicit S or X) returns without issuing any.
    pub fn escalate(self: &Arc<Self>, txn: TxnId) -> Result<(), LockError> {
        if self.readonly {
            return Err(LockError::ReadonlyContext {
                resource: self.name.clone(),
            });
        }
        let current = self.get_explicit_lock_type(txn);
        let num_children = self.get_num_children(txn);
        if num_children == 0 && current == LockType::NL {
            return Err(LockError::NoLockHeld {
                txn,
                resource: self.name.clone(),
            });
        }
        if matches!(current, LockType::S | LockType::X) {
            // Already escalated; S and X admit no descendant locks.
            return Ok(());
        }

        let descendants = self.lock_descendants(txn);
        debug_assert_eq!(
            descendants.len() as u64,
            num_children,
            "descendant count for {txn} diverged from held locks at {}",
            self.name
        );
        let sis_count = descendants
            .iter()
            .filter(|l| matches!(l.lock_type, LockType::S | LockType::IS))
            .count() as u64;
        let shared_suffices =
            sis_count == num_children && matches!(current, LockType::NL | LockType::IS);

        let (target, mut release_set) = if shared_suffices {
            let names = descendants
                .into_iter()
                .filter(|l| matches!(l.lock_type, LockType::S | LockType::IS))
                .map(|l| l.name)
                .collect::<Vec<_>>();
            (LockType::S, names)
        } else {
            let names = descendants.into_iter().map(|l| l.name).collect::<Vec<_>>();
            (LockType::X, names)
        };
        if current != LockType::NL {
            release_set.push(self.name.clone());
        }

        self.table
            .acquire_and_release(txn, &self.name, target, &release_set)?;
        self.settle_released(txn, &release_set);
        if current == LockType::NL {
            // The combined call materialized a new lock at this node, so its
            // ancestors gained one descendant lock.
            if let Some(parent) = self.parent.upgrade() {
                parent.update_chain(txn, 1);
            }
        }
        tracing::debug!(txn = %txn, resource = %self.name, target = %target, "locks escalated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Lock held by `txn` directly at this node, `NL` if none.
    #[must_use]
    pub fn get_explicit_lock_type(&self, txn: TxnId) -> LockType {
        self.table.get_lock_type(txn, &self.name)
    }

    /// Access level `txn` has at this node once ancestor locks are taken
    /// into account: an explicit lock wins; otherwise an ancestor SIX
    /// contributes S, ancestor S/X pass through, and bare intention locks
    /// contribute nothing.
    #[must_use]
    pub fn get_effective_lock_type(&self, txn: TxnId) -> LockType {
        let explicit = self.get_explicit_lock_type(txn);
        if explicit != LockType::NL {
            return explicit;
        }
        let Some(parent) = self.parent.upgrade() else {
            return LockType::NL;
        };
        match parent.get_effective_lock_type(txn) {
            LockType::SIX => LockType::S,
            LockType::IS | LockType::IX => LockType::NL,
            inherited => inherited,
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// True if `txn` holds an explicit SIX on any strict ancestor.
    fn has_six_ancestor(&self, txn: TxnId) -> bool {
        let mut cursor = self.parent.upgrade();
        while let Some(ctx) = cursor {
            if ctx.get_explicit_lock_type(txn) == LockType::SIX {
                return true;
            }
            cursor = ctx.parent.upgrade();
        }
        false
    }

    /// Non-NL locks `txn` holds strictly below this node.
    fn lock_descendants(&self, txn: TxnId) -> Vec<Lock> {
        self.table
            .get_locks(txn)
            .into_iter()
            .filter(|l| l.name.is_descendant_of(&self.name) && l.lock_type != LockType::NL)
            .collect()
    }

    /// Descendant resources on which `txn` holds S or IS.
    fn sis_descendants(&self, txn: TxnId) -> Vec<ResourceName> {
        self.table
            .get_locks(txn)
            .into_iter()
            .filter(|l| {
                l.name.is_descendant_of(&self.name)
                    && matches!(l.lock_type, LockType::S | LockType::IS)
            })
            .map(|l| l.name)
            .collect()
    }

    /// Apply `delta` to this node's descendant count for `txn` and propagate
    /// the same change to every ancestor.
    fn update_chain(&self, txn: TxnId, delta: i64) {
        let mut counts = self.num_child_locks.lock();
        let entry = counts.entry(txn).or_insert(0);
        *entry = entry
            .checked_add_signed(delta)
            .expect("descendant lock count underflow");
        drop(counts);
        if let Some(parent) = self.parent.upgrade() {
            parent.update_chain(txn, delta);
        }
    }

    /// Context for `name`, which must be this node's name or lie below it.
    fn descendant_context(self: &Arc<Self>, name: &ResourceName) -> Arc<LockContext> {
        let mut ctx = Arc::clone(self);
        for segment in &name.segments()[self.name.depth()..] {
            ctx = ctx.child_context(segment.clone());
        }
        ctx
    }

    /// After a combined acquire-and-release, shrink the descendant counts
    /// along each released resource's ancestor chain. The node's own name is
    /// skipped: its lock was replaced, not removed, so its contribution to
    /// the ancestors is unchanged.
    fn settle_released(self: &Arc<Self>, txn: TxnId, released: &[ResourceName]) {
        for name in released {
            if *name == self.name {
                continue;
            }
            let ctx = self.descendant_context(name);
            if let Some(parent) = ctx.parent_context() {
                parent.update_chain(txn, -1);
            }
        }
    }
}

impl fmt::Display for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockContext({})", self.name)
    }
}

impl fmt::Debug for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockContext")
            .field("name", &self.name)
            .field("readonly", &self.readonly)
            .field(
                "child_locks_disabled",
                &self.child_locks_disabled.load(Ordering::Relaxed),
            )
            .field("children", &self.children.lock().len())
            .finish_non_exhaustive()
    }
}
