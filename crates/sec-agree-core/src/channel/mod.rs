//! Secure-channel boundary and its coordination with the state machine

pub(crate) mod coordinator;
pub mod secure_channel;

pub use secure_channel::{
    AssociationParams, ChannelState, ChannelStatus, IpsecLocalParams, IpsecPeerParams,
    IpsecRemoteParams, NoChannelFactory, SecureChannel, SecureChannelFactory, TlsParams,
};
