//! Core types shared by every layer of the security-agreement engine

pub mod endpoints;
pub mod handles;
pub mod mechanism;
pub mod state;
pub mod status;

pub use endpoints::{AuthChallenge, IpsecInfo, NetworkEndpoints, TransportType, MAX_IPSEC_KEY_LEN};
pub use handles::{ChannelId, OwnerId, OwnerKind, SecAgreeHandle};
pub use mechanism::{
    lists_match, EncryptAlgorithm, IpsecAlgorithm, IpsecMode, IpsecProtocol, MechanismType,
    QValue, SecurityHeader, MAX_Q_VALUE_LEN,
};
pub use state::{Reason, Role, SecAgreeState};
pub use status::{AssociationStatus, InsertClientList, SecAgreeStatus, SpecialStandard};

/// Response code asking the client to negotiate (RFC 3329 §2.3.1)
pub const RESPONSE_SECURITY_AGREEMENT_REQUIRED: u16 = 494;
/// Response code asking the client to include `Require: sec-agree`
pub const RESPONSE_EXTENSION_REQUIRED: u16 = 421;
/// Response code for a sec-agree request that crossed more than one hop
pub const RESPONSE_BAD_GATEWAY: u16 = 502;

/// Option tag of the security agreement extension
pub const SEC_AGREE_OPTION_TAG: &str = "sec-agree";
