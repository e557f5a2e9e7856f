//! Multigranularity lock coordination for a transactional data store.
//!
//! Resources form a hierarchy (database -> table -> page -> record) in which
//! a coarse lock on an ancestor implicitly grants weaker access to every
//! descendant, and intention locks (IS/IX/SIX) let a transaction declare
//! future fine-grained intent without locking the whole subtree.
//!
//! Two layers cooperate:
//!
//! - [`LockTable`]: the raw grant table, one resource at a time. Atomic per
//!   call, fail-fast on conflicts, no hierarchy knowledge.
//! - [`LockContext`]: a lazily materialized tree, one node per resource
//!   name, that enforces top-down acquisition, bottom-up release, SIX
//!   exclusivity and single-call escalation, and keeps per-transaction
//!   descendant-lock counts so those checks never scan the hierarchy.
//!
//! The lock-mode algebra itself lives in [`granlock_types`].

pub mod context;
pub mod error;
pub mod table;

pub use context::LockContext;
pub use error::LockError;
pub use table::{Lock, LockTable};

pub use granlock_types::{LockType, ResourceName, TxnId};
