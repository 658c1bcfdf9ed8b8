//! Identifiers for agreements, owners and secure channels

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena handle of a security-agreement
///
/// The generation is stamped when the slot is allocated and is never 0. Any
/// handle whose generation no longer matches the slot's refers to a
/// destructed agreement.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SecAgreeHandle {
    pub index: u32,
    pub generation: u64,
}

impl SecAgreeHandle {
    pub const fn new(index: u32, generation: u64) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for SecAgreeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sec-agree#{}.{}", self.index, self.generation)
    }
}

/// Identity of an owner (transaction, call-leg, registration client)
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct OwnerId(pub uuid::Uuid);

impl OwnerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}

/// Kind of SIP object owning an agreement
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum OwnerKind {
    Transaction,
    CallLeg,
    Subscription,
    RegClient,
    Other,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKind::Transaction => write!(f, "Transaction"),
            OwnerKind::CallLeg => write!(f, "Call-Leg"),
            OwnerKind::Subscription => write!(f, "Subscription"),
            OwnerKind::RegClient => write!(f, "Reg-Client"),
            OwnerKind::Other => write!(f, "Other"),
        }
    }
}

/// Identity of a secure channel
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}
