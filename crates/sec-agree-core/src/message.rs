//! Message accessor boundary
//!
//! The engine never parses SIP. The transaction layer presents each message
//! as an [`InboundMessage`] (what was received) or an [`OutboundMessage`]
//! (what is about to be sent) and encodes whatever the engine writes into
//! [`OutboundSecurity`].

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::types::{AuthChallenge, MechanismType, SecurityHeader, TransportType};

const INTERVAL_TOO_BRIEF: u16 = 423;

fn is_excluded_method(method: &str) -> bool {
    method.eq_ignore_ascii_case("ACK") || method.eq_ignore_ascii_case("CANCEL")
}

/// View of a received request or response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Request method, or the CSeq method of a response
    pub method: String,
    /// `None` for requests
    pub status_code: Option<u16>,
    pub cseq_step: u32,
    pub transport: Option<TransportType>,
    pub received_from: Option<SocketAddr>,
    pub security_client: Vec<SecurityHeader>,
    pub security_server: Vec<SecurityHeader>,
    pub security_verify: Vec<SecurityHeader>,
    /// `Require` or `Proxy-Require` carries sec-agree
    pub require_sec_agree: bool,
    pub supported_sec_agree: bool,
    pub via_count: usize,
    /// Proxy-Authenticate challenges of a response
    pub challenges: Vec<AuthChallenge>,
    /// The message arrived over the agreement's secure channel
    pub over_secure_channel: bool,
}

impl InboundMessage {
    pub fn request(method: impl Into<String>, cseq_step: u32) -> Self {
        Self {
            method: method.into(),
            cseq_step,
            via_count: 1,
            ..Default::default()
        }
    }

    pub fn response(method: impl Into<String>, status_code: u16, cseq_step: u32) -> Self {
        Self {
            method: method.into(),
            status_code: Some(status_code),
            cseq_step,
            via_count: 1,
            ..Default::default()
        }
    }

    pub fn with_transport(mut self, transport: TransportType) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_received_from(mut self, addr: SocketAddr) -> Self {
        self.received_from = Some(addr);
        self
    }

    pub fn with_security_client(mut self, list: Vec<SecurityHeader>) -> Self {
        self.security_client = list;
        self
    }

    pub fn with_security_server(mut self, list: Vec<SecurityHeader>) -> Self {
        self.security_server = list;
        self
    }

    pub fn with_security_verify(mut self, list: Vec<SecurityHeader>) -> Self {
        self.security_verify = list;
        self
    }

    pub fn with_require(mut self) -> Self {
        self.require_sec_agree = true;
        self
    }

    pub fn with_supported(mut self) -> Self {
        self.supported_sec_agree = true;
        self
    }

    pub fn with_via_count(mut self, count: usize) -> Self {
        self.via_count = count;
        self
    }

    pub fn with_challenge(mut self, challenge: AuthChallenge) -> Self {
        self.challenges.push(challenge);
        self
    }

    pub fn over_secure_channel(mut self) -> Self {
        self.over_secure_channel = true;
        self
    }

    pub fn is_request(&self) -> bool {
        self.status_code.is_none()
    }

    /// A response with a code of 200 or above
    pub fn is_final_response(&self) -> bool {
        matches!(self.status_code, Some(code) if code >= 200)
    }

    /// Whether the message can take part in a client negotiation
    ///
    /// Responses outside 4xx never do; neither do ACK and CANCEL.
    pub fn can_be_part_of_negotiation(&self) -> bool {
        if let Some(code) = self.status_code {
            if !(400..500).contains(&code) {
                return false;
            }
        }
        !is_excluded_method(&self.method)
    }

    /// Whether the server should look at this request at all
    pub fn is_negotiable_request(&self) -> bool {
        self.is_request() && !is_excluded_method(&self.method)
    }

    /// Security-Server carries a digest header
    pub fn offers_digest(&self) -> bool {
        self.security_server.iter().any(|h| h.mechanism == MechanismType::Digest)
    }
}

/// Security headers the engine adds to an outgoing message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSecurity {
    pub security_client: Vec<SecurityHeader>,
    pub security_verify: Vec<SecurityHeader>,
    pub security_server: Vec<SecurityHeader>,
    pub require_sec_agree: bool,
    pub proxy_require_sec_agree: bool,
    /// Challenges to answer with Proxy-Authorization
    pub authorization_challenges: Vec<AuthChallenge>,
    /// Server challenge to send as Proxy-Authenticate
    pub proxy_authenticate: Option<AuthChallenge>,
}

impl OutboundSecurity {
    pub fn is_empty(&self) -> bool {
        *self == OutboundSecurity::default()
    }

    /// Drop everything inserted so far
    pub fn clear(&mut self) {
        *self = OutboundSecurity::default();
    }
}

/// View of a request or response about to be sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub method: String,
    pub status_code: Option<u16>,
    pub cseq_step: u32,
    pub security: OutboundSecurity,
}

impl OutboundMessage {
    pub fn request(method: impl Into<String>, cseq_step: u32) -> Self {
        Self {
            method: method.into(),
            cseq_step,
            ..Default::default()
        }
    }

    pub fn response(method: impl Into<String>, status_code: u16, cseq_step: u32) -> Self {
        Self {
            method: method.into(),
            status_code: Some(status_code),
            cseq_step,
            ..Default::default()
        }
    }

    pub fn is_request(&self) -> bool {
        self.status_code.is_none()
    }

    /// Client side: 4xx responses and requests other than ACK and CANCEL
    pub fn can_be_part_of_negotiation(&self) -> bool {
        if let Some(code) = self.status_code {
            if !(400..500).contains(&code) {
                return false;
            }
        }
        !is_excluded_method(&self.method)
    }

    /// Server side: 4xx responses except 423 Interval Too Brief
    pub fn is_negotiation_response(&self) -> bool {
        matches!(self.status_code, Some(code) if (400..500).contains(&code) && code != INTERVAL_TOO_BRIEF)
    }
}
