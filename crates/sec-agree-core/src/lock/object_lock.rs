//! Generation-checked locking of a stack object
//!
//! An [`ObjectLock`] binds a generation id to a shared [`TripleLock`]. Every
//! acquisition re-reads which lock set the object currently lives on, since
//! [`ObjectLock::rehome`] may swap it concurrently, and fails with
//! [`LockError::Destructed`] once the generation no longer matches.
//!
//! - API path ([`ObjectLock::lock_api`]): object mutex, then API token.
//! - Event path ([`ObjectLock::lock_event`]): process mutex, then object
//!   mutex once no other thread holds the API token. A thread that already
//!   holds the API token gets a reentrant guard without locking anything.

use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::triple_lock::TripleLock;
use crate::errors::LockError;

/// Generation id plus the lock set guarding one object
#[derive(Debug)]
pub struct ObjectLock {
    current: Mutex<Arc<TripleLock>>,
    generation: AtomicU64,
}

impl ObjectLock {
    /// An object with its own lock set
    pub fn new(generation: u64) -> Self {
        Self::with_lock_set(Arc::new(TripleLock::new()), generation)
    }

    /// An object sharing `lock_set` with other objects
    pub fn with_lock_set(lock_set: Arc<TripleLock>, generation: u64) -> Self {
        Self {
            current: Mutex::new(lock_set),
            generation: AtomicU64::new(generation),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether `expected` still names this object
    pub fn is_live(&self, expected: u64) -> bool {
        let current = self.generation();
        current != 0 && current == expected
    }

    /// The lock set the object currently lives on
    pub fn lock_set(&self) -> Arc<TripleLock> {
        self.current.lock().clone()
    }

    fn still_current(&self, lock: &Arc<TripleLock>) -> bool {
        Arc::ptr_eq(lock, &self.current.lock())
    }

    /// Acquire the object for an API-path operation
    pub fn lock_api(&self, expected: u64) -> Result<ApiGuard, LockError> {
        loop {
            let lock = self.lock_set();
            lock.lock_object();

            if !self.still_current(&lock) {
                lock.unlock_object();
                continue;
            }
            if !self.is_live(expected) {
                lock.unlock_object();
                return Err(LockError::Destructed { expected });
            }

            lock.enter_api();
            return Ok(ApiGuard { lock, _not_send: PhantomData });
        }
    }

    /// Acquire the object for an event-path operation
    pub fn lock_event(&self, expected: u64) -> Result<EventGuard, LockError> {
        loop {
            let lock = self.lock_set();

            if lock.holds_api() {
                if !self.is_live(expected) {
                    return Err(LockError::Destructed { expected });
                }
                return Ok(EventGuard { lock: None, _not_send: PhantomData });
            }

            lock.lock_process();
            loop {
                lock.lock_object();
                if !self.is_live(expected) {
                    lock.unlock_object();
                    lock.unlock_process();
                    return Err(LockError::Destructed { expected });
                }
                if !lock.api_busy() {
                    break;
                }
                lock.unlock_object();
                lock.wait_api_free();
            }

            if !self.still_current(&lock) {
                lock.unlock_object();
                lock.unlock_process();
                continue;
            }
            return Ok(EventGuard { lock: Some(lock), _not_send: PhantomData });
        }
    }

    /// Reset the generation so every later acquisition fails
    ///
    /// Call while holding a guard on this object.
    pub fn invalidate(&self) {
        self.generation.store(0, Ordering::Release);
    }

    /// Move the object to another lock set
    ///
    /// Threads blocked on the old set retry on the new one. The caller must
    /// not hold a guard on this object.
    pub fn rehome(&self, lock_set: Arc<TripleLock>) {
        loop {
            let old = self.lock_set();
            old.lock_object();
            let mut current = self.current.lock();
            if !Arc::ptr_eq(&old, &current) {
                drop(current);
                old.unlock_object();
                continue;
            }
            *current = lock_set;
            drop(current);
            old.unlock_object();
            return;
        }
    }
}

/// Held for the duration of an API-path operation
#[must_use = "the object is unlocked when the guard is dropped"]
pub struct ApiGuard {
    lock: Arc<TripleLock>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ApiGuard {
    fn drop(&mut self) {
        self.lock.leave_api();
        self.lock.unlock_object();
    }
}

/// Held for the duration of an event-path operation
#[must_use = "the object is unlocked when the guard is dropped"]
pub struct EventGuard {
    lock: Option<Arc<TripleLock>>,
    _not_send: PhantomData<*const ()>,
}

impl EventGuard {
    /// True when the calling thread already held the API token
    pub fn is_reentrant(&self) -> bool {
        self.lock.is_none()
    }
}

impl Drop for EventGuard {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.unlock_object();
            lock.unlock_process();
        }
    }
}
