//! Lifecycle and concurrency substrate for long-lived stack objects
//!
//! Each object carries a generation id and lives on a [`TripleLock`]: an
//! object mutex for state mutation, a process mutex serializing event-path
//! work, and an API token taken by direct application calls. Lock attempts
//! with a stale generation fail with
//! [`LockError::Destructed`](crate::errors::LockError::Destructed).

pub mod object_lock;
pub mod triple_lock;

pub use object_lock::{ApiGuard, EventGuard, ObjectLock};
pub use triple_lock::TripleLock;
