//! Security mechanism headers and RFC 3329 preference values
//!
//! A [`SecurityHeader`] is the parsed form of one entry of a Security-Client,
//! Security-Server or Security-Verify list. Parsing of the SIP header itself
//! happens in the message layer; this module only models the values the
//! negotiation engine reasons about.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{SecAgreeError, SecAgreeResult};

/// Longest accepted textual q-value
pub const MAX_Q_VALUE_LEN: usize = 12;

/// Security mechanism named in a security header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MechanismType {
    Digest,
    Tls,
    IpsecIke,
    IpsecMan,
    Ipsec3gpp,
    /// Any mechanism token the engine does not know
    Other,
}

impl MechanismType {
    /// Mechanisms the engine can negotiate
    pub const SUPPORTED: [MechanismType; 3] =
        [MechanismType::Digest, MechanismType::Tls, MechanismType::Ipsec3gpp];

    /// RFC 3329 / TS 33.203 token
    pub fn as_str(self) -> &'static str {
        match self {
            MechanismType::Digest => "digest",
            MechanismType::Tls => "tls",
            MechanismType::IpsecIke => "ipsec-ike",
            MechanismType::IpsecMan => "ipsec-man",
            MechanismType::Ipsec3gpp => "ipsec-3gpp",
            MechanismType::Other => "other",
        }
    }
}

impl fmt::Display for MechanismType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MechanismType {
    type Err = SecAgreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err(SecAgreeError::invalid_argument("empty mechanism token"));
        }
        Ok(match token.to_ascii_lowercase().as_str() {
            "digest" => MechanismType::Digest,
            "tls" => MechanismType::Tls,
            "ipsec-ike" => MechanismType::IpsecIke,
            "ipsec-man" => MechanismType::IpsecMan,
            "ipsec-3gpp" => MechanismType::Ipsec3gpp,
            _ => MechanismType::Other,
        })
    }
}

/// IPsec integrity algorithm (`alg` parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpsecAlgorithm {
    HmacMd5_96,
    HmacSha1_96,
}

impl IpsecAlgorithm {
    pub const ALL: [IpsecAlgorithm; 2] = [IpsecAlgorithm::HmacMd5_96, IpsecAlgorithm::HmacSha1_96];
}

/// IPsec encryption algorithm (`ealg` parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptAlgorithm {
    DesEde3Cbc,
    AesCbc,
    Null,
}

impl EncryptAlgorithm {
    pub const ALL: [EncryptAlgorithm; 3] =
        [EncryptAlgorithm::DesEde3Cbc, EncryptAlgorithm::AesCbc, EncryptAlgorithm::Null];
}

/// IPsec mode (`mod` parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpsecMode {
    Trans,
    Tun,
}

/// IPsec protocol (`prot` parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpsecProtocol {
    Esp,
    Ah,
}

/// RFC 3329 `q` parameter split into integer and thousandths
///
/// `"0.5"` parses to `{int: 0, dec: 500}` so the fractional part compares
/// numerically regardless of how many digits were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QValue {
    pub int: u32,
    pub dec: u32,
}

impl QValue {
    pub const fn new(int: u32, dec: u32) -> Self {
        Self { int, dec }
    }

    /// Parse a textual q-value such as `"1"`, `"0.5"` or `"0.125"`
    pub fn parse(text: &str) -> SecAgreeResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SecAgreeError::invalid_argument("empty q-value"));
        }
        if text.len() > MAX_Q_VALUE_LEN {
            return Err(SecAgreeError::invalid_argument(format!(
                "q-value '{}' longer than {} characters",
                text, MAX_Q_VALUE_LEN
            )));
        }

        let (int_part, dec_part) = match text.split_once('.') {
            Some((i, d)) => (i, d),
            None => (text, ""),
        };
        let bad = || SecAgreeError::invalid_argument(format!("malformed q-value '{}'", text));

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        if dec_part.len() > 3 || !dec_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }

        let int = int_part.parse::<u32>().map_err(|_| bad())?;
        let mut dec = 0u32;
        for (i, digit) in dec_part.bytes().enumerate() {
            dec += u32::from(digit - b'0') * 10u32.pow(2 - i as u32);
        }
        Ok(Self { int, dec })
    }
}

impl fmt::Display for QValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dec == 0 {
            write!(f, "{}", self.int)
        } else {
            let digits = format!("{:03}", self.dec);
            write!(f, "{}.{}", self.int, digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for QValue {
    type Err = SecAgreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QValue::parse(s)
    }
}

/// One entry of a Security-Client / Security-Server / Security-Verify list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityHeader {
    pub mechanism: MechanismType,
    pub preference: Option<QValue>,
    pub algorithm: Option<IpsecAlgorithm>,
    pub encrypt_algorithm: Option<EncryptAlgorithm>,
    pub mode: Option<IpsecMode>,
    pub protocol: Option<IpsecProtocol>,
    pub spi_c: Option<u32>,
    pub spi_s: Option<u32>,
    pub port_c: Option<u16>,
    pub port_s: Option<u16>,
    /// `d-ver` parameter, ignored by list comparison
    pub digest_verify: Option<String>,
}

impl SecurityHeader {
    pub fn new(mechanism: MechanismType) -> Self {
        Self {
            mechanism,
            preference: None,
            algorithm: None,
            encrypt_algorithm: None,
            mode: None,
            protocol: None,
            spi_c: None,
            spi_s: None,
            port_c: None,
            port_s: None,
            digest_verify: None,
        }
    }

    pub fn digest() -> Self {
        Self::new(MechanismType::Digest)
    }

    pub fn tls() -> Self {
        Self::new(MechanismType::Tls)
    }

    /// An ipsec-3gpp header in transport mode over ESP
    pub fn ipsec_3gpp(algorithm: IpsecAlgorithm, encrypt_algorithm: EncryptAlgorithm) -> Self {
        Self {
            algorithm: Some(algorithm),
            encrypt_algorithm: Some(encrypt_algorithm),
            mode: Some(IpsecMode::Trans),
            protocol: Some(IpsecProtocol::Esp),
            ..Self::new(MechanismType::Ipsec3gpp)
        }
    }

    pub fn with_preference(mut self, q: QValue) -> Self {
        self.preference = Some(q);
        self
    }

    pub fn with_spis(mut self, spi_c: u32, spi_s: u32) -> Self {
        self.spi_c = Some(spi_c);
        self.spi_s = Some(spi_s);
        self
    }

    pub fn with_ports(mut self, port_c: u16, port_s: u16) -> Self {
        self.port_c = Some(port_c);
        self.port_s = Some(port_s);
        self
    }

    pub fn with_digest_verify(mut self, value: impl Into<String>) -> Self {
        self.digest_verify = Some(value.into());
        self
    }

    /// Equality used when comparing a received list against a stored one
    pub fn matches(&self, other: &SecurityHeader) -> bool {
        self.mechanism == other.mechanism
            && self.preference == other.preference
            && self.algorithm == other.algorithm
            && self.encrypt_algorithm == other.encrypt_algorithm
            && self.mode == other.mode
            && self.protocol == other.protocol
            && self.spi_c == other.spi_c
            && self.spi_s == other.spi_s
            && self.port_c == other.port_c
            && self.port_s == other.port_s
    }
}

/// Ordered comparison of two security lists, ignoring `d-ver`
pub fn lists_match(a: &[SecurityHeader], b: &[SecurityHeader]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.matches(y))
}
