//! Security-agreement states, roles and state-change reasons
//!
//! The state is the single source of truth for which operations are legal on
//! an agreement. The guard predicates below are queried by the agreement,
//! the secure-channel coordinator and the message drivers.
//!
//! ```text
//!            Client                                   Server
//!   Idle ──Init──> ClientLocalListReady       Idle ──Init──> ServerLocalListReady
//!     │                │    │                   │                 │        │
//!     │ rcvd list      │    └─send─> HandlingInitialMsg             │ rcvd   │ send
//!     ▼                │                 │ resolved  rcvd list      ▼ list   │
//!  ClientRemoteListReady  rcvd list      ▼             │     ServerReady ─send┤
//!     │ Init           └──────> LocalListSent          ▼                      ▼
//!     ▼                              │ rcvd     ServerRemoteListReady ─Init─> ServerReady
//!  ClientChooseSecurity <────────────┘                                        │
//!     │ SetSecurity                                                   Active <┘
//!     ▼
//!   Active
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a security-agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecAgreeState {
    /// Freshly allocated, role not yet set
    Undefined,
    /// Role set, nothing negotiated
    Idle,
    /// Client initialized its local list
    ClientLocalListReady,
    /// Client received a Security-Server list before initializing
    ClientRemoteListReady,
    /// Initial request carrying Security-Client is waiting for address resolution
    ClientHandlingInitialMsg,
    /// Security-Client list was sent
    ClientLocalListSent,
    /// Client must choose a mechanism
    ClientChooseSecurity,
    /// Server initialized its local list
    ServerLocalListReady,
    /// Server received a Security-Client list before initializing
    ServerRemoteListReady,
    /// Server holds both lists and is ready to respond
    ServerReady,
    /// Negotiation completed
    Active,
    /// The transport (TLS) makes an agreement unnecessary
    NoAgreementRequired,
    /// Negotiation failed; a new agreement has to replace this one
    Invalid,
    /// Final state
    Terminated,
}

impl SecAgreeState {
    /// Every state, in declaration order
    pub const ALL: [SecAgreeState; 14] = [
        SecAgreeState::Undefined,
        SecAgreeState::Idle,
        SecAgreeState::ClientLocalListReady,
        SecAgreeState::ClientRemoteListReady,
        SecAgreeState::ClientHandlingInitialMsg,
        SecAgreeState::ClientLocalListSent,
        SecAgreeState::ClientChooseSecurity,
        SecAgreeState::ServerLocalListReady,
        SecAgreeState::ServerRemoteListReady,
        SecAgreeState::ServerReady,
        SecAgreeState::Active,
        SecAgreeState::NoAgreementRequired,
        SecAgreeState::Invalid,
        SecAgreeState::Terminated,
    ];

    /// Not Undefined, Invalid or Terminated
    pub fn is_valid(self) -> bool {
        !matches!(
            self,
            SecAgreeState::Undefined | SecAgreeState::Invalid | SecAgreeState::Terminated
        )
    }

    /// Whether an owner may attach in this state
    pub fn can_attach_owner(self) -> bool {
        matches!(
            self,
            SecAgreeState::Idle
                | SecAgreeState::ClientLocalListReady
                | SecAgreeState::ServerLocalListReady
                | SecAgreeState::Active
        )
    }

    /// Whether more than one owner may be attached in this state
    pub fn can_attach_several_owners(self) -> bool {
        matches!(self, SecAgreeState::Active | SecAgreeState::NoAgreementRequired)
    }

    /// Whether the local security list may be changed
    pub fn can_modify_local_list(self) -> bool {
        matches!(
            self,
            SecAgreeState::Idle
                | SecAgreeState::ServerRemoteListReady
                | SecAgreeState::ClientRemoteListReady
        )
    }

    /// Whether an inbound message is of interest
    pub fn should_process_received_message(self) -> bool {
        matches!(
            self,
            SecAgreeState::Idle
                | SecAgreeState::ServerLocalListReady
                | SecAgreeState::ClientLocalListReady
                | SecAgreeState::ClientLocalListSent
                | SecAgreeState::NoAgreementRequired
                | SecAgreeState::Active
        )
    }

    /// Whether an outbound message is of interest for the given role
    pub fn should_process_message_to_send(self, role: Role) -> bool {
        match self {
            SecAgreeState::ServerLocalListReady
            | SecAgreeState::ServerReady
            | SecAgreeState::ClientLocalListReady => true,
            SecAgreeState::Active => role == Role::Client,
            _ => false,
        }
    }

    /// Whether a resolved destination is of interest
    pub fn should_process_dest_resolved(self) -> bool {
        self == SecAgreeState::ClientHandlingInitialMsg
    }

    /// Whether a remote list may be loaded from an inbound message
    pub fn can_load_remote_list(self) -> bool {
        matches!(
            self,
            SecAgreeState::Idle
                | SecAgreeState::ServerLocalListReady
                | SecAgreeState::ClientLocalListReady
                | SecAgreeState::ClientLocalListSent
        )
    }

    /// Whether the client is waiting for a Security-Server list
    pub fn client_awaits_remote_list(self) -> bool {
        matches!(
            self,
            SecAgreeState::ClientLocalListReady | SecAgreeState::ClientLocalListSent
        )
    }

    /// Whether a received remote list must be compared with the stored one
    pub fn should_compare_remote_list(self) -> bool {
        self == SecAgreeState::Active
    }

    /// Whether the client may choose a mechanism
    pub fn can_choose_security(self) -> bool {
        matches!(
            self,
            SecAgreeState::ClientRemoteListReady | SecAgreeState::ClientChooseSecurity
        )
    }

    /// States whose entry discards negotiation-only data
    pub fn ends_negotiation(self) -> bool {
        matches!(
            self,
            SecAgreeState::Active
                | SecAgreeState::NoAgreementRequired
                | SecAgreeState::Invalid
                | SecAgreeState::Terminated
        )
    }

    /// Human readable name
    pub fn as_str(self) -> &'static str {
        match self {
            SecAgreeState::Undefined => "Undefined",
            SecAgreeState::Idle => "Idle",
            SecAgreeState::ClientLocalListReady => "Client Local List Ready",
            SecAgreeState::ClientRemoteListReady => "Client Remote List Ready",
            SecAgreeState::ClientHandlingInitialMsg => "Client Handling Initial Msg",
            SecAgreeState::ClientLocalListSent => "Client Local List Sent",
            SecAgreeState::ClientChooseSecurity => "Client Choose Security",
            SecAgreeState::ServerLocalListReady => "Server Local List Ready",
            SecAgreeState::ServerRemoteListReady => "Server Remote List Ready",
            SecAgreeState::ServerReady => "Server Ready",
            SecAgreeState::Active => "Active",
            SecAgreeState::NoAgreementRequired => "No Agreement Required",
            SecAgreeState::Invalid => "Invalid",
            SecAgreeState::Terminated => "Terminated",
        }
    }
}

impl Default for SecAgreeState {
    fn default() -> Self {
        SecAgreeState::Undefined
    }
}

impl fmt::Display for SecAgreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of the agreement in the negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    Undefined,
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Undefined => write!(f, "Undefined"),
            Role::Client => write!(f, "Client"),
            Role::Server => write!(f, "Server"),
        }
    }
}

/// Reason attached to a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Reason {
    #[default]
    Undefined,
    UserInit,
    SecurityClientRcvd,
    SecurityServerRcvd,
    SecurityServerSent,
    MsgSendFailure,
    SecurityClientMismatch,
    SecurityVerifyMismatch,
    ResponseMissing,
    InvalidOrMissingDigest,
    SecurityObjExpired,
    OutOfResources,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reason::Undefined => "Undefined",
            Reason::UserInit => "User Init",
            Reason::SecurityClientRcvd => "Security-Client Received",
            Reason::SecurityServerRcvd => "Security-Server Received",
            Reason::SecurityServerSent => "Security-Server Sent",
            Reason::MsgSendFailure => "Message Send Failure",
            Reason::SecurityClientMismatch => "Security-Client Mismatch",
            Reason::SecurityVerifyMismatch => "Security-Verify Mismatch",
            Reason::ResponseMissing => "Response Missing",
            Reason::InvalidOrMissingDigest => "Invalid Or Missing Digest",
            Reason::SecurityObjExpired => "Secure Channel Expired",
            Reason::OutOfResources => "Out Of Resources",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        let invalid: Vec<_> = SecAgreeState::ALL.iter().filter(|s| !s.is_valid()).collect();
        assert_eq!(
            invalid,
            vec![&SecAgreeState::Undefined, &SecAgreeState::Invalid, &SecAgreeState::Terminated]
        );
    }

    #[test]
    fn test_owner_attach_guards() {
        assert!(!SecAgreeState::ClientChooseSecurity.can_attach_owner());
        assert!(SecAgreeState::Active.can_attach_owner());
        assert!(SecAgreeState::Active.can_attach_several_owners());
        assert!(!SecAgreeState::Idle.can_attach_several_owners());
        // NoAgreementRequired allows extra owners but not the first attach
        assert!(!SecAgreeState::NoAgreementRequired.can_attach_owner());
    }

    #[test]
    fn test_message_to_send_is_role_qualified_in_active() {
        assert!(SecAgreeState::Active.should_process_message_to_send(Role::Client));
        assert!(!SecAgreeState::Active.should_process_message_to_send(Role::Server));
        assert!(SecAgreeState::ServerReady.should_process_message_to_send(Role::Server));
    }
}
