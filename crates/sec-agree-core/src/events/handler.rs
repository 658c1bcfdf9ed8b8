//! Application callbacks
//!
//! Installed once on the manager with
//! [`SecAgreeManager::set_event_handler`](crate::manager::SecAgreeManager::set_event_handler).
//! Callbacks run on the dispatching thread with no agreement lock held, so
//! they may call back into the engine.

use crate::types::{Reason, SecAgreeHandle, SecAgreeState, SecAgreeStatus};

/// Application side of the security-agreement notifications
pub trait SecAgreeEventHandler: Send + Sync {
    /// Called before the owners are told
    fn on_state_changed(&self, agreement: SecAgreeHandle, state: SecAgreeState, reason: Reason);

    fn on_status(&self, _agreement: SecAgreeHandle, _status: SecAgreeStatus) {}
}

/// Handler that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventHandler;

impl SecAgreeEventHandler for NoopEventHandler {
    fn on_state_changed(&self, _agreement: SecAgreeHandle, _state: SecAgreeState, _reason: Reason) {}
}
