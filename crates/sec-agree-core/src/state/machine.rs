//! Transition table of the security-agreement state machine
//!
//! [`next_transition`] is a pure function of role, current state and the
//! processing event. It never mutates anything; the agreement applies the
//! returned [`Transition`] under its object lock and queues the state-change
//! notification afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{
    MechanismType, Reason, Role, SecAgreeState, TransportType, RESPONSE_EXTENSION_REQUIRED,
    RESPONSE_SECURITY_AGREEMENT_REQUIRED,
};

/// What an inbound message carried, as far as the state machine cares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedSummary {
    /// Security-Server (client side) or Security-Client (server side) list
    pub remote_list_present: bool,
    /// Security-Verify list
    pub local_list_present: bool,
    pub transport: Option<TransportType>,
    /// `Require` or `Supported` carried the sec-agree option tag
    pub option_tag_present: bool,
}

/// Input of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingEvent {
    Init,
    MsgReceived(ReceivedSummary),
    MsgToSend { has_secure_channel: bool },
    DestResolved { transport: Option<TransportType> },
    SetSecurity,
}

impl ProcessingEvent {
    fn is_tls(transport: Option<TransportType>) -> bool {
        transport == Some(TransportType::Tls)
    }
}

impl fmt::Display for ProcessingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingEvent::Init => write!(f, "Init"),
            ProcessingEvent::MsgReceived(_) => write!(f, "Msg Received"),
            ProcessingEvent::MsgToSend { .. } => write!(f, "Msg To Send"),
            ProcessingEvent::DestResolved { .. } => write!(f, "Dest Resolved"),
            ProcessingEvent::SetSecurity => write!(f, "Set Security"),
        }
    }
}

/// A state change and its side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: SecAgreeState,
    pub reason: Reason,
    /// Response code to recommend from now on
    pub recommend: Option<u16>,
    /// The local list is discarded before the change
    pub clears_local_list: bool,
    /// The next request must carry Security-Client if ipsec-3gpp gets chosen
    pub arms_client_list_by_ipsec: bool,
}

impl Transition {
    fn to(state: SecAgreeState) -> Self {
        Self {
            to: state,
            reason: Reason::Undefined,
            recommend: None,
            clears_local_list: false,
            arms_client_list_by_ipsec: false,
        }
    }

    fn because(mut self, reason: Reason) -> Self {
        self.reason = reason;
        self
    }

    fn recommending(mut self, code: u16) -> Self {
        self.recommend = Some(code);
        self
    }
}

/// Look up the transition for `(state, event)`
///
/// Returns `None` for pairs the table does not list; the state stays as it
/// is in that case.
pub fn next_transition(
    role: Role,
    state: SecAgreeState,
    event: &ProcessingEvent,
) -> Option<Transition> {
    use SecAgreeState as S;

    let transition = match (state, *event) {
        (S::Idle, ProcessingEvent::MsgReceived(rcvd)) => {
            if rcvd.remote_list_present {
                match role {
                    Role::Client => Transition::to(S::ClientRemoteListReady),
                    Role::Server => Transition::to(S::ServerRemoteListReady)
                        .recommending(RESPONSE_SECURITY_AGREEMENT_REQUIRED),
                    Role::Undefined => return None,
                }
            } else if ProcessingEvent::is_tls(rcvd.transport) && role == Role::Server {
                Transition::to(S::NoAgreementRequired)
            } else {
                return None;
            }
        }
        (S::Idle, ProcessingEvent::Init) => match role {
            Role::Client => Transition::to(S::ClientLocalListReady),
            Role::Server => Transition::to(S::ServerLocalListReady),
            Role::Undefined => return None,
        },

        (S::ClientLocalListReady, ProcessingEvent::MsgReceived(rcvd))
        | (S::ClientLocalListSent, ProcessingEvent::MsgReceived(rcvd)) => {
            if !rcvd.remote_list_present {
                return None;
            }
            let mut t =
                Transition::to(S::ClientChooseSecurity).because(Reason::SecurityServerRcvd);
            t.arms_client_list_by_ipsec = state == S::ClientLocalListSent;
            t
        }
        (S::ClientLocalListReady, ProcessingEvent::MsgToSend { has_secure_channel }) => {
            if has_secure_channel {
                Transition::to(S::ClientLocalListSent)
            } else {
                Transition::to(S::ClientHandlingInitialMsg)
            }
        }

        (S::ClientHandlingInitialMsg, ProcessingEvent::DestResolved { transport }) => {
            if ProcessingEvent::is_tls(transport) {
                Transition::to(S::NoAgreementRequired)
            } else {
                Transition::to(S::ClientLocalListSent)
            }
        }

        (S::ClientRemoteListReady, ProcessingEvent::Init) => {
            Transition::to(S::ClientChooseSecurity).because(Reason::UserInit)
        }
        (S::ClientRemoteListReady, ProcessingEvent::SetSecurity) => {
            let mut t = Transition::to(S::Active);
            t.clears_local_list = true;
            t
        }
        (S::ClientChooseSecurity, ProcessingEvent::SetSecurity) => Transition::to(S::Active),

        (S::ServerLocalListReady, ProcessingEvent::MsgToSend { .. }) => Transition::to(S::Active),
        (S::ServerLocalListReady, ProcessingEvent::MsgReceived(rcvd)) => {
            if rcvd.remote_list_present {
                let code = if rcvd.option_tag_present || rcvd.remote_list_present {
                    RESPONSE_SECURITY_AGREEMENT_REQUIRED
                } else {
                    RESPONSE_EXTENSION_REQUIRED
                };
                Transition::to(S::ServerReady).recommending(code)
            } else if ProcessingEvent::is_tls(rcvd.transport) {
                Transition::to(S::NoAgreementRequired)
            } else {
                return None;
            }
        }
        (S::ServerReady, ProcessingEvent::MsgToSend { .. }) => Transition::to(S::Active),
        (S::ServerRemoteListReady, ProcessingEvent::Init) => Transition::to(S::ServerReady),

        _ => return None,
    };
    Some(transition)
}

/// Whether the secure channel should be constructed on `event`
pub fn should_construct_channel(state: SecAgreeState, event: &ProcessingEvent) -> bool {
    use SecAgreeState as S;
    match event {
        ProcessingEvent::Init => matches!(
            state,
            S::Idle | S::ClientRemoteListReady | S::ServerRemoteListReady
        ),
        ProcessingEvent::SetSecurity => {
            matches!(state, S::ClientRemoteListReady | S::ClientChooseSecurity)
        }
        _ => false,
    }
}

/// Whether the secure channel should be activated on `event`
pub fn should_activate_channel(state: SecAgreeState, event: &ProcessingEvent) -> bool {
    use SecAgreeState as S;
    match event {
        ProcessingEvent::SetSecurity => {
            matches!(state, S::ClientRemoteListReady | S::ClientChooseSecurity)
        }
        ProcessingEvent::Init => state == S::ServerRemoteListReady,
        ProcessingEvent::MsgReceived(_) => state == S::ServerLocalListReady,
        _ => false,
    }
}

/// The client picks a mechanism without having offered a local list
///
/// TLS is opened on behalf of the remote list in that case.
pub fn client_is_choosing(
    state: SecAgreeState,
    event: &ProcessingEvent,
    selected: Option<MechanismType>,
) -> bool {
    (state == SecAgreeState::ClientRemoteListReady && *event == ProcessingEvent::SetSecurity)
        || selected == Some(MechanismType::Tls)
}
