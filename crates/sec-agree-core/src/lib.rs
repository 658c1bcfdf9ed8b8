//! # Sec-Agree-Core - SIP Security-Agreement for RVoIP
//!
//! Negotiation engine for the Security Mechanism Agreement of RFC 3329, as
//! used on the 3GPP / TISPAN Gm interface (TS 24.229, ES 283.003).
//!
//! A client offers its mechanisms in `Security-Client`, the server answers
//! with `Security-Server`, and the client echoes the server list back in
//! `Security-Verify` over the chosen mechanism (digest, TLS or
//! ipsec-3gpp). This crate tracks one such negotiation per
//! [`SecAgreement`], drives the secure channel (IPsec SA pair or TLS
//! connection) that carries the result and tells the SIP objects sharing
//! the agreement what happened.
//!
//! The crate does not parse SIP messages and does not implement IPsec or
//! TLS. The transaction layer feeds it [`InboundMessage`] /
//! [`OutboundMessage`] views, and the channel comes from a
//! [`SecureChannelFactory`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoip_sec_agree_core::prelude::*;
//!
//! let manager = SecAgreeManager::new(
//!     SecAgreeConfig::default().without_ipsec().without_tls(),
//!     Arc::new(NoChannelFactory),
//! ).unwrap();
//!
//! let handle = manager.create_agreement(None).unwrap();
//! let agreement = manager.agreement(handle).unwrap();
//! agreement.set_role(Role::Client).unwrap();
//! agreement.push_local_header(SecurityHeader::digest()).unwrap();
//! agreement.init().unwrap();
//!
//! assert_eq!(agreement.state().unwrap(), SecAgreeState::ClientLocalListReady);
//! assert_eq!(manager.dispatch_pending(), 1);
//! ```

pub mod agreement;
pub mod channel;
pub mod config;
pub mod errors;
pub mod events;
pub mod lock;
pub mod logging;
pub mod manager;
pub mod message;
pub mod owner;
pub mod security_data;
pub mod selection;
pub mod state;
pub mod types;

pub use agreement::{ReceivedOutcome, SecAgreement};
pub use channel::{NoChannelFactory, SecureChannel, SecureChannelFactory};
pub use config::SecAgreeConfig;
pub use errors::{SecAgreeError, SecAgreeResult};
pub use events::{SecAgreeEvent, SecAgreeEventHandler};
pub use manager::SecAgreeManager;
pub use message::{InboundMessage, OutboundMessage};
pub use owner::SecAgreeOwner;
pub use types::{
    AssociationStatus, MechanismType, Reason, Role, SecAgreeHandle, SecAgreeState,
    SecAgreeStatus, SecurityHeader,
};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::agreement::{ReceivedOutcome, SecAgreement};
    pub use crate::channel::{
        ChannelState, ChannelStatus, NoChannelFactory, SecureChannel, SecureChannelFactory,
    };
    pub use crate::config::SecAgreeConfig;
    pub use crate::errors::{ChannelError, SecAgreeError, SecAgreeResult};
    pub use crate::events::{SecAgreeEvent, SecAgreeEventHandler};
    pub use crate::manager::SecAgreeManager;
    pub use crate::message::{InboundMessage, OutboundMessage, OutboundSecurity};
    pub use crate::owner::SecAgreeOwner;
    pub use crate::security_data::SelectedSecurity;
    pub use crate::types::{
        AssociationStatus, AuthChallenge, EncryptAlgorithm, IpsecAlgorithm, IpsecInfo,
        MechanismType, OwnerId, OwnerKind, QValue, Reason, Role, SecAgreeHandle, SecAgreeState,
        SecAgreeStatus, SecurityHeader, SpecialStandard, TransportType,
    };
}
