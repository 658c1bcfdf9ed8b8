//! Configuration for the security-agreement engine
//!
//! Mechanism support (IPsec, TLS and negotiation-only IPsec) is a runtime
//! setting, checked when an agreement is constructed or a mechanism is
//! chosen.
//!
//! ## Quick Start
//!
//! ```rust
//! use rvoip_sec_agree_core::config::SecAgreeConfig;
//!
//! let config = SecAgreeConfig::default()
//!     .with_max_agreements(64)
//!     .with_default_local_ipsec_ip("10.0.0.1".parse().unwrap());
//!
//! assert!(config.validate().is_ok());
//! assert!(config.capabilities().ipsec_enabled);
//! ```
//!
//! ## Loading from TOML
//!
//! ```rust
//! use rvoip_sec_agree_core::config::SecAgreeConfig;
//!
//! let config = SecAgreeConfig::from_toml_str(r#"
//!     max_agreements = 16
//!     tls_enabled = false
//! "#).unwrap();
//!
//! assert_eq!(config.max_agreements, 16);
//! assert!(!config.tls_enabled);
//! assert_eq!(config.max_owners_per_agreement, 32);
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::errors::{SecAgreeError, SecAgreeResult};
use crate::types::MechanismType;

/// Runtime settings of a [`SecAgreeManager`](crate::manager::SecAgreeManager)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecAgreeConfig {
    /// Arena capacity
    pub max_agreements: usize,

    /// Owners that may share one agreement
    pub max_owners_per_agreement: usize,

    /// Pending ordinary state notifications before enqueueing fails
    ///
    /// Termination notifications are not counted against this limit.
    pub state_event_capacity: usize,

    /// ipsec-3gpp may be negotiated
    pub ipsec_enabled: bool,

    /// ipsec-3gpp is negotiated but no secure channel is built for it
    pub ipsec_negotiation_only: bool,

    /// tls may be negotiated
    pub tls_enabled: bool,

    /// Local address stamped on new agreements for IPsec
    pub default_local_ipsec_ip: Option<IpAddr>,

    /// Local address stamped on new agreements for TLS
    pub default_local_tls_addr: Option<SocketAddr>,

    /// Buffer of the public event broadcast channel
    pub event_broadcast_capacity: usize,
}

impl Default for SecAgreeConfig {
    fn default() -> Self {
        Self {
            max_agreements: 1024,
            max_owners_per_agreement: 32,
            state_event_capacity: 4096,
            ipsec_enabled: true,
            ipsec_negotiation_only: false,
            tls_enabled: true,
            default_local_ipsec_ip: None,
            default_local_tls_addr: None,
            event_broadcast_capacity: 256,
        }
    }
}

impl SecAgreeConfig {
    pub fn with_max_agreements(mut self, max: usize) -> Self {
        self.max_agreements = max;
        self
    }

    pub fn with_max_owners(mut self, max: usize) -> Self {
        self.max_owners_per_agreement = max;
        self
    }

    pub fn with_state_event_capacity(mut self, capacity: usize) -> Self {
        self.state_event_capacity = capacity;
        self
    }

    pub fn with_event_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.event_broadcast_capacity = capacity;
        self
    }

    pub fn without_ipsec(mut self) -> Self {
        self.ipsec_enabled = false;
        self
    }

    /// Negotiate ipsec-3gpp without driving a secure channel for it
    pub fn with_ipsec_negotiation_only(mut self) -> Self {
        self.ipsec_negotiation_only = true;
        self
    }

    pub fn without_tls(mut self) -> Self {
        self.tls_enabled = false;
        self
    }

    pub fn with_default_local_ipsec_ip(mut self, ip: IpAddr) -> Self {
        self.default_local_ipsec_ip = Some(ip);
        self
    }

    pub fn with_default_local_tls_addr(mut self, addr: SocketAddr) -> Self {
        self.default_local_tls_addr = Some(addr);
        self
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// Ok(()) if valid, Err(message) if invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.max_agreements == 0 {
            return Err("Max agreements must be greater than 0".to_string());
        }
        if self.max_agreements > u32::MAX as usize {
            return Err("Max agreements must fit a 32 bit slot index".to_string());
        }
        if self.max_owners_per_agreement == 0 {
            return Err("Max owners per agreement must be greater than 0".to_string());
        }
        if self.state_event_capacity == 0 {
            return Err("State event capacity must be greater than 0".to_string());
        }
        if self.event_broadcast_capacity == 0 {
            return Err("Event broadcast capacity must be greater than 0".to_string());
        }
        if self.ipsec_negotiation_only && !self.ipsec_enabled {
            return Err("IPsec negotiation-only mode requires IPsec to be enabled".to_string());
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> SecAgreeResult<Self> {
        let config: SecAgreeConfig = toml::from_str(text)
            .map_err(|e| SecAgreeError::config(format!("invalid TOML: {}", e)))?;
        config.validate().map_err(SecAgreeError::config)?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> SecAgreeResult<String> {
        toml::to_string(self).map_err(|e| SecAgreeError::config(e.to_string()))
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            ipsec_enabled: self.ipsec_enabled,
            ipsec_negotiation_only: self.ipsec_negotiation_only,
            tls_enabled: self.tls_enabled,
        }
    }
}

/// Mechanism support derived from [`SecAgreeConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub ipsec_enabled: bool,
    pub ipsec_negotiation_only: bool,
    pub tls_enabled: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        SecAgreeConfig::default().capabilities()
    }
}

impl Capabilities {
    /// Whether the engine can negotiate `mechanism`
    pub fn supports(&self, mechanism: MechanismType) -> bool {
        match mechanism {
            MechanismType::Digest => true,
            MechanismType::Tls => self.tls_enabled,
            MechanismType::Ipsec3gpp => self.ipsec_enabled,
            _ => false,
        }
    }

    /// Whether a secure channel has to be driven for `mechanism`
    pub fn channel_handles(&self, mechanism: MechanismType) -> bool {
        match mechanism {
            MechanismType::Tls => self.tls_enabled,
            MechanismType::Ipsec3gpp => self.ipsec_enabled && !self.ipsec_negotiation_only,
            _ => false,
        }
    }

    /// Whether the channel has to be driven for an optional selection
    ///
    /// Nothing selected yet counts as handled: the channel is built ahead of
    /// the choice.
    pub fn channel_handles_selection(&self, selected: Option<MechanismType>) -> bool {
        selected.map_or(true, |m| self.channel_handles(m))
    }
}
