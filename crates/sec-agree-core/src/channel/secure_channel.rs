//! Boundary to the secure-channel layer
//!
//! A secure channel is the runtime object behind an IPsec SA pair or a TLS
//! connection. The engine never implements one; it drives whatever the
//! [`SecureChannelFactory`] hands out. Channel implementations report their
//! own state changes through
//! [`SecAgreeManager::channel_state_changed`](crate::manager::SecAgreeManager::channel_state_changed),
//! which only queues, so a channel must never call back into an agreement
//! synchronously from one of the methods below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ChannelResult;
use crate::types::{
    ChannelId, EncryptAlgorithm, IpsecAlgorithm, MechanismType, SecAgreeHandle, SecurityHeader,
    TransportType,
};

/// Lifecycle of a secure channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    Idle,
    Initiated,
    Active,
    Closing,
    Closed,
    Terminated,
}

impl ChannelState {
    /// Closing, Closed or Terminated
    pub fn is_going_down(self) -> bool {
        matches!(self, ChannelState::Closing | ChannelState::Closed | ChannelState::Terminated)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Idle => "Idle",
            ChannelState::Initiated => "Initiated",
            ChannelState::Active => "Active",
            ChannelState::Closing => "Closing",
            ChannelState::Closed => "Closed",
            ChannelState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Status reports a channel may raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelStatus {
    IpsecLifetimeExpired,
}

/// SPIs and ports of one side of an IPsec SA pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecPeerParams {
    pub spi_c: Option<u32>,
    pub spi_s: Option<u32>,
    pub port_c: Option<u16>,
    pub port_s: Option<u16>,
}

impl IpsecPeerParams {
    /// Parameters announced in a Security-Client / Security-Server header
    pub fn from_header(header: &SecurityHeader) -> Self {
        Self {
            spi_c: header.spi_c,
            spi_s: header.spi_s,
            port_c: header.port_c,
            port_s: header.port_s,
        }
    }

    /// Write the parameters back into a header
    pub fn apply_to(&self, header: &mut SecurityHeader) {
        header.spi_c = self.spi_c.or(header.spi_c);
        header.spi_s = self.spi_s.or(header.spi_s);
        header.port_c = self.port_c.or(header.port_c);
        header.port_s = self.port_s.or(header.port_s);
    }
}

/// Local half of an ipsec-3gpp setup, known before the peer answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpsecLocalParams {
    pub algorithm: Option<IpsecAlgorithm>,
    pub encrypt_algorithm: Option<EncryptAlgorithm>,
    pub local_ip: Option<IpAddr>,
    pub peer: IpsecPeerParams,
}

/// Remote half of an ipsec-3gpp setup plus the keys
#[derive(Clone, PartialEq, Eq)]
pub struct IpsecRemoteParams {
    pub remote: Option<SocketAddr>,
    pub transport: Option<TransportType>,
    pub peer: IpsecPeerParams,
    pub ik: Vec<u8>,
    pub ck: Vec<u8>,
    pub lifetime: Option<Duration>,
}

impl fmt::Debug for IpsecRemoteParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpsecRemoteParams")
            .field("remote", &self.remote)
            .field("transport", &self.transport)
            .field("peer", &self.peer)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Addresses of a TLS connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsParams {
    pub local: Option<SocketAddr>,
    pub remote: SocketAddr,
}

/// What the channel actually negotiated with the peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationParams {
    pub mechanism: Option<MechanismType>,
    pub local: IpsecPeerParams,
    pub remote: IpsecPeerParams,
    pub remote_addr: Option<SocketAddr>,
}

/// A secure channel driven by one security-agreement
pub trait SecureChannel: Send + Sync + fmt::Debug {
    fn id(&self) -> ChannelId;

    fn state(&self) -> ChannelState;

    /// Application correlation data (e.g. the private user identity)
    fn set_context(&self, context: &str) -> ChannelResult<()>;

    fn set_local_ipsec_params(&self, params: &IpsecLocalParams) -> ChannelResult<()>;

    /// Allocate local resources; after this the local SPIs and ports are known
    fn initiate(&self) -> ChannelResult<()>;

    /// Local SPIs and ports the channel allocated on [`initiate`](Self::initiate)
    fn local_ipsec_params(&self) -> ChannelResult<IpsecPeerParams>;

    fn set_remote_ipsec_params(&self, params: &IpsecRemoteParams) -> ChannelResult<()>;

    fn set_tls_params(&self, params: &TlsParams) -> ChannelResult<()>;

    fn set_mechanism(&self, mechanism: MechanismType) -> ChannelResult<()>;

    fn activate(&self) -> ChannelResult<()>;

    fn terminate(&self) -> ChannelResult<()>;

    fn association_params(&self) -> ChannelResult<AssociationParams>;

    fn start_lifetime_timer(&self, interval: Duration) -> ChannelResult<()>;

    fn remaining_lifetime(&self) -> ChannelResult<Option<Duration>>;
}

/// Creates secure channels on behalf of agreements
pub trait SecureChannelFactory: Send + Sync {
    fn construct(&self, agreement: SecAgreeHandle) -> ChannelResult<Arc<dyn SecureChannel>>;
}

/// Factory for deployments without TLS or IPsec support
///
/// Every construction fails, which the coordinator only reaches when a
/// channel-backed mechanism is enabled in the configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChannelFactory;

impl SecureChannelFactory for NoChannelFactory {
    fn construct(&self, agreement: SecAgreeHandle) -> ChannelResult<Arc<dyn SecureChannel>> {
        Err(crate::errors::ChannelError::resource(format!(
            "no secure channel support for {}",
            agreement
        )))
    }
}
