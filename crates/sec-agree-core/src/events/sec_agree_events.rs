//! Security-agreement events
//!
//! [`QueuedEvent`] is what operations put on the internal queue; the
//! dispatcher turns each entry into handler and owner callbacks and then
//! publishes a [`SecAgreeEvent`] to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelState, ChannelStatus};
use crate::types::{ChannelId, Reason, SecAgreeHandle, SecAgreeState, SecAgreeStatus};

/// Public security-agreement events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SecAgreeEvent {
    /// Agreement state changed
    StateChanged {
        handle: SecAgreeHandle,
        state: SecAgreeState,
        reason: Reason,
        timestamp: DateTime<Utc>,
    },

    /// IPsec association status notification
    Status {
        handle: SecAgreeHandle,
        status: SecAgreeStatus,
        timestamp: DateTime<Utc>,
    },

    /// Agreement destructed and its slot released
    Destructed {
        handle: SecAgreeHandle,
        reason: Reason,
        timestamp: DateTime<Utc>,
    },
}

impl SecAgreeEvent {
    pub fn handle(&self) -> SecAgreeHandle {
        match self {
            SecAgreeEvent::StateChanged { handle, .. }
            | SecAgreeEvent::Status { handle, .. }
            | SecAgreeEvent::Destructed { handle, .. } => *handle,
        }
    }
}

/// Internal queue entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedEvent {
    StateChanged {
        handle: SecAgreeHandle,
        state: SecAgreeState,
        reason: Reason,
    },

    /// Guaranteed; never counted against the queue capacity
    Terminated {
        handle: SecAgreeHandle,
        reason: Reason,
    },

    Status {
        handle: SecAgreeHandle,
        status: SecAgreeStatus,
    },

    /// Hand the secure channel to every owner
    SupplyChannel {
        handle: SecAgreeHandle,
    },

    ChannelStateChanged {
        handle: SecAgreeHandle,
        channel: ChannelId,
        state: ChannelState,
    },

    ChannelStatus {
        handle: SecAgreeHandle,
        channel: ChannelId,
        status: ChannelStatus,
    },
}

impl QueuedEvent {
    pub fn handle(&self) -> SecAgreeHandle {
        match self {
            QueuedEvent::StateChanged { handle, .. }
            | QueuedEvent::Terminated { handle, .. }
            | QueuedEvent::Status { handle, .. }
            | QueuedEvent::SupplyChannel { handle }
            | QueuedEvent::ChannelStateChanged { handle, .. }
            | QueuedEvent::ChannelStatus { handle, .. } => *handle,
        }
    }

    pub fn is_termination(&self) -> bool {
        matches!(self, QueuedEvent::Terminated { .. })
    }
}
