//! Transport, endpoint hints and IPsec key material

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::errors::{SecAgreeError, SecAgreeResult};

/// Longest accepted IK/CK in bytes (192 bits)
pub const MAX_IPSEC_KEY_LEN: usize = 24;

/// Transport a message was sent or received over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    Udp,
    Tcp,
    Tls,
    Sctp,
}

impl TransportType {
    /// UDP or TCP, the transports ipsec-3gpp protects
    pub fn is_ipsec_carrier(self) -> bool {
        matches!(self, TransportType::Udp | TransportType::Tcp)
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Udp => write!(f, "UDP"),
            TransportType::Tcp => write!(f, "TCP"),
            TransportType::Tls => write!(f, "TLS"),
            TransportType::Sctp => write!(f, "SCTP"),
        }
    }
}

/// Local and remote addresses used to build TLS connections and IPsec SAs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoints {
    pub local_ipsec_ip: Option<IpAddr>,
    pub local_tls: Option<SocketAddr>,
    pub remote_ipsec: Option<SocketAddr>,
    pub remote_ipsec_transport: Option<TransportType>,
    pub remote_tls: Option<SocketAddr>,
}

impl NetworkEndpoints {
    /// Whether a remote address for `transport` is already known
    pub fn has_remote_for(&self, transport: TransportType) -> bool {
        match transport {
            TransportType::Tls => self.remote_tls.is_some(),
            _ => self.remote_ipsec.is_some(),
        }
    }

    /// Record a resolved remote address for `transport`
    pub fn set_remote_for(&mut self, transport: TransportType, addr: SocketAddr) {
        match transport {
            TransportType::Tls => self.remote_tls = Some(addr),
            other => {
                self.remote_ipsec = Some(addr);
                self.remote_ipsec_transport = Some(other);
            }
        }
    }

    pub fn clear_local_ipsec(&mut self) {
        self.local_ipsec_ip = None;
    }
}

/// Keys and lifetime for ipsec-3gpp
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecInfo {
    pub ik: Vec<u8>,
    pub ck: Vec<u8>,
    pub lifetime: Option<Duration>,
}

impl IpsecInfo {
    pub fn new(ik: impl Into<Vec<u8>>, ck: impl Into<Vec<u8>>) -> Self {
        Self { ik: ik.into(), ck: ck.into(), lifetime: None }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Reject keys longer than 192 bits
    pub fn validate(&self) -> SecAgreeResult<()> {
        if self.ik.len() > MAX_IPSEC_KEY_LEN || self.ck.len() > MAX_IPSEC_KEY_LEN {
            return Err(SecAgreeError::invalid_argument(format!(
                "IPsec keys are limited to {} bytes (ik={}, ck={})",
                MAX_IPSEC_KEY_LEN,
                self.ik.len(),
                self.ck.len()
            )));
        }
        Ok(())
    }
}

// Keys never reach the logs
impl fmt::Debug for IpsecInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpsecInfo")
            .field("ik_len", &self.ik.len())
            .field("ck_len", &self.ck.len())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Digest challenge sent by a server or received by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: String,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
    pub opaque: Option<String>,
}

impl AuthChallenge {
    pub fn new(realm: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            nonce: nonce.into(),
            algorithm: None,
            qop: None,
            opaque: None,
        }
    }
}
