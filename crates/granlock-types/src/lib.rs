//! Foundation value types for multigranularity lock coordination.
//!
//! This crate is deliberately small: it defines the lock-mode algebra, the
//! hierarchical resource naming scheme, and the transaction identifier. The
//! stateful lock table and context tree live in the `granlock` crate and
//! build on these types.

pub mod lock_type;
pub mod resource;
pub mod txn;

pub use lock_type::LockType;
pub use resource::ResourceName;
pub use txn::{InvalidTxnId, TxnId};
