//! Object mutex, process mutex and API token sharing one condition variable
//!
//! Both mutexes are recursive per thread. The API token is a counter whose
//! first holder is remembered together with the object-mutex depth it held
//! at the time, so an event-path entry from the same thread can be detected
//! and allowed through.

use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use tracing::warn;

#[derive(Debug, Default)]
struct LockState {
    object_owner: Option<ThreadId>,
    object_depth: usize,
    process_owner: Option<ThreadId>,
    process_depth: usize,
    api_count: usize,
    api_owner: Option<ThreadId>,
    api_owner_depth: usize,
}

/// A set of locks that one or more stack objects can share
#[derive(Debug, Default)]
pub struct TripleLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl TripleLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the object mutex, blocking while another thread holds it
    pub fn lock_object(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while matches!(state.object_owner, Some(owner) if owner != me) {
            self.released.wait(&mut state);
        }
        state.object_owner = Some(me);
        state.object_depth += 1;
    }

    pub fn unlock_object(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.object_owner != Some(me) || state.object_depth == 0 {
            warn!("object mutex released by a thread that does not hold it");
            return;
        }
        state.object_depth -= 1;
        if state.object_depth == 0 {
            state.object_owner = None;
            drop(state);
            self.released.notify_all();
        }
    }

    /// Acquire the process mutex, blocking while another thread holds it
    pub fn lock_process(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while matches!(state.process_owner, Some(owner) if owner != me) {
            self.released.wait(&mut state);
        }
        state.process_owner = Some(me);
        state.process_depth += 1;
    }

    pub fn unlock_process(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.process_owner != Some(me) || state.process_depth == 0 {
            warn!("process mutex released by a thread that does not hold it");
            return;
        }
        state.process_depth -= 1;
        if state.process_depth == 0 {
            state.process_owner = None;
            drop(state);
            self.released.notify_all();
        }
    }

    /// Take the API token; the caller holds the object mutex
    pub fn enter_api(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        state.api_count += 1;
        if state.api_owner.is_none() {
            state.api_owner = Some(me);
            state.api_owner_depth = state.object_depth;
        }
    }

    pub fn leave_api(&self) {
        let mut state = self.state.lock();
        if state.api_count == 0 {
            warn!("API token released while not held");
            return;
        }
        state.api_count -= 1;
        if state.api_count == 0 {
            state.api_owner = None;
            state.api_owner_depth = 0;
            drop(state);
            self.released.notify_all();
        }
    }

    /// Whether the calling thread holds the API token
    pub fn holds_api(&self) -> bool {
        self.state.lock().api_owner == Some(thread::current().id())
    }

    /// Whether another thread holds the API token
    pub fn api_busy(&self) -> bool {
        let state = self.state.lock();
        state.api_count > 0 && state.api_owner != Some(thread::current().id())
    }

    /// Block until no other thread holds the API token
    pub fn wait_api_free(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.api_count > 0 && state.api_owner != Some(me) {
            self.released.wait(&mut state);
        }
    }

    /// Object-mutex depth recorded when the API token was first taken
    pub fn api_owner_depth(&self) -> usize {
        self.state.lock().api_owner_depth
    }

    pub fn object_depth(&self) -> usize {
        let state = self.state.lock();
        if state.object_owner == Some(thread::current().id()) {
            state.object_depth
        } else {
            0
        }
    }
}
