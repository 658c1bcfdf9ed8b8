//! Special standards, association status and status notifications

use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard whose extra rules apply to the agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SpecialStandard {
    #[default]
    Undefined,
    /// TISPAN ETSI ES 283.003
    Tispan283003,
    /// 3GPP TS 24.229
    ThreeGpp24229,
    /// PacketCable 2.0
    PacketCable2,
}

impl SpecialStandard {
    /// Every defined special standard describes a Gm interface
    pub fn is_gm_interface(self) -> bool {
        !matches!(self, SpecialStandard::Undefined)
    }
}

/// ES 283.003 lifecycle of the IPsec security associations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AssociationStatus {
    #[default]
    Undefined,
    Temporary,
    Established,
}

/// Status reported to the application and owners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecAgreeStatus {
    IpsecLifetimeExpired,
    IpsecTemporaryAssociation,
    IpsecEstablishedAssociation,
}

impl fmt::Display for SecAgreeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecAgreeStatus::IpsecLifetimeExpired => write!(f, "IPsec Lifetime Expired"),
            SecAgreeStatus::IpsecTemporaryAssociation => write!(f, "IPsec Temporary Association"),
            SecAgreeStatus::IpsecEstablishedAssociation => {
                write!(f, "IPsec Established Association")
            }
        }
    }
}

/// Controls when the client inserts its Security-Client list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InsertClientList {
    /// Only on the initial request
    #[default]
    Never,
    /// The application forces insertion on every request
    ByApp,
    /// First request after ipsec-3gpp was chosen
    ByIpsec,
}
