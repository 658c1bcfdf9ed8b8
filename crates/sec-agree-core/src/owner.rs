//! Owners of a security-agreement
//!
//! Transactions, call-legs and registration clients share an agreement.
//! The agreement keeps only a weak reference to each of them and pushes
//! notifications from the dispatcher, never from inside an operation.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::channel::SecureChannel;
use crate::manager::SecAgreeManager;
use crate::types::{OwnerId, OwnerKind, Reason, Role, SecAgreeHandle, SecAgreeState, SecAgreeStatus};

/// A SIP object that uses a security-agreement
///
/// Every notification has an empty default so owners only implement what
/// they care about.
pub trait SecAgreeOwner: Send + Sync {
    fn id(&self) -> OwnerId;

    fn kind(&self) -> OwnerKind;

    fn on_state_changed(&self, _agreement: SecAgreeHandle, _state: SecAgreeState, _reason: Reason) {}

    fn on_status(&self, _agreement: SecAgreeHandle, _status: SecAgreeStatus) {}

    /// The negotiated secure channel is ready for this owner's messages
    fn on_secure_channel_attached(&self, _agreement: SecAgreeHandle, _channel: Arc<dyn SecureChannel>) {}

    /// The agreement was destructed while this owner was still attached
    fn on_detached(&self, _agreement: SecAgreeHandle) {}

    /// A received message requires a new agreement
    ///
    /// `current` was invalidated just before the call. Return the handle of
    /// a fresh agreement of `role`, typically created with
    /// [`SecAgreeManager::create_agreement`] and copied from `current`, or
    /// `None` to continue without one.
    fn on_negotiation_required(
        &self,
        _manager: &SecAgreeManager,
        _current: Option<SecAgreeHandle>,
        _role: Role,
    ) -> Option<SecAgreeHandle> {
        None
    }
}

/// An attached owner
#[derive(Clone)]
pub struct OwnerRecord {
    pub id: OwnerId,
    pub kind: OwnerKind,
    owner: Weak<dyn SecAgreeOwner>,
}

impl OwnerRecord {
    pub fn new(owner: &Arc<dyn SecAgreeOwner>) -> Self {
        Self {
            id: owner.id(),
            kind: owner.kind(),
            owner: Arc::downgrade(owner),
        }
    }

    /// The owner, if it is still alive
    pub fn upgrade(&self) -> Option<Arc<dyn SecAgreeOwner>> {
        self.owner.upgrade()
    }
}

impl fmt::Debug for OwnerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("alive", &(self.owner.strong_count() > 0))
            .finish()
    }
}
