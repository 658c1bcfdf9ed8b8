//! Mechanism preference and selection (RFC 3329 §2.2)
//!
//! Headers are ranked by their `q` parameter. A header without `q` ranks
//! below any header carrying one. Ties always keep the header seen first, so
//! every search here is deterministic for a given list order.

use std::collections::HashMap;

use crate::config::Capabilities;
use crate::types::{
    EncryptAlgorithm, IpsecAlgorithm, IpsecMode, IpsecProtocol, MechanismType, QValue,
    SecurityHeader,
};

/// True when `candidate` is strictly more preferred than `current`
pub fn is_larger_q(current: Option<QValue>, candidate: Option<QValue>) -> bool {
    match (current, candidate) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(a), Some(b)) => b.int > a.int || (b.int == a.int && b.dec > a.dec),
    }
}

/// IPsec parameters a header must match; `None` matches anything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpsecConstraints {
    pub algorithm: Option<IpsecAlgorithm>,
    pub encrypt_algorithm: Option<EncryptAlgorithm>,
    pub mode: Option<IpsecMode>,
    pub protocol: Option<IpsecProtocol>,
}

impl IpsecConstraints {
    /// Constraints copied from a local ipsec-3gpp header
    pub fn from_header(header: &SecurityHeader) -> Self {
        Self {
            algorithm: header.algorithm,
            encrypt_algorithm: header.encrypt_algorithm,
            mode: header.mode,
            protocol: header.protocol,
        }
    }

    fn admits(&self, header: &SecurityHeader) -> bool {
        fn ok<T: PartialEq>(want: Option<T>, have: Option<T>) -> bool {
            want.is_none() || want == have
        }
        ok(self.algorithm, header.algorithm)
            && ok(self.encrypt_algorithm, header.encrypt_algorithm)
            && ok(self.mode, header.mode)
            && ok(self.protocol, header.protocol)
    }
}

/// Index of the most preferred header of `mechanism` in `list`
///
/// For ipsec-3gpp, headers not admitted by `constraints` are skipped.
pub fn find_best_header(
    list: &[SecurityHeader],
    mechanism: MechanismType,
    constraints: &IpsecConstraints,
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, header) in list.iter().enumerate() {
        if header.mechanism != mechanism {
            continue;
        }
        if mechanism == MechanismType::Ipsec3gpp && !constraints.admits(header) {
            continue;
        }
        best = match best {
            None => Some(index),
            Some(current) if is_larger_q(list[current].preference, header.preference) => {
                Some(index)
            }
            keep => keep,
        };
    }
    best
}

/// Result of the automatic client choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MechanismChoice {
    pub mechanism: MechanismType,
    pub local_index: usize,
    pub remote_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CandidateKey {
    Plain(MechanismType),
    Ipsec(IpsecAlgorithm, Option<EncryptAlgorithm>),
}

impl CandidateKey {
    /// ipsec-3gpp headers without `alg` cannot be matched
    fn of(header: &SecurityHeader) -> Option<Self> {
        match header.mechanism {
            MechanismType::Ipsec3gpp => header
                .algorithm
                .map(|alg| CandidateKey::Ipsec(alg, header.encrypt_algorithm)),
            other => Some(CandidateKey::Plain(other)),
        }
    }
}

/// Choose the mechanism a client should use
///
/// The remote (server) list is reduced to its most preferred header per
/// mechanism, and per `alg`/`ealg` pair for ipsec-3gpp. The local list is
/// then walked in order; the first local header with a remote counterpart is
/// the initial choice and is only replaced by a counterpart with a strictly
/// larger `q`.
pub fn choose_mechanism(
    local: &[SecurityHeader],
    remote: &[SecurityHeader],
    capabilities: &Capabilities,
) -> Option<MechanismChoice> {
    if local.is_empty() || remote.is_empty() {
        return None;
    }

    let mut preferred: HashMap<CandidateKey, usize> = HashMap::new();
    for (index, header) in remote.iter().enumerate() {
        if !capabilities.supports(header.mechanism) {
            continue;
        }
        let Some(key) = CandidateKey::of(header) else {
            continue;
        };
        match preferred.get(&key) {
            Some(&current) if !is_larger_q(remote[current].preference, header.preference) => {}
            _ => {
                preferred.insert(key, index);
            }
        }
    }

    let mut best: Option<MechanismChoice> = None;
    for (local_index, header) in local.iter().enumerate() {
        let Some(&remote_index) = CandidateKey::of(header).and_then(|key| preferred.get(&key))
        else {
            continue;
        };
        let replace = match &best {
            None => true,
            Some(current) => is_larger_q(
                remote[current.remote_index].preference,
                remote[remote_index].preference,
            ),
        };
        if replace {
            best = Some(MechanismChoice { mechanism: header.mechanism, local_index, remote_index });
        }
    }
    best
}

/// Whether a local list may be offered
///
/// Only the first ipsec-3gpp header is constrained: it needs `alg` and
/// `ealg`, protocol `esp` and mode `trans`.
pub fn is_list_legal(list: &[SecurityHeader]) -> bool {
    match list.iter().find(|h| h.mechanism == MechanismType::Ipsec3gpp) {
        None => true,
        Some(header) => {
            header.algorithm.is_some()
                && header.encrypt_algorithm.is_some()
                && header.protocol == Some(IpsecProtocol::Esp)
                && header.mode == Some(IpsecMode::Trans)
        }
    }
}

/// Whether `list` is exactly one ipsec-3gpp header
pub fn is_single_ipsec(list: &[SecurityHeader]) -> bool {
    matches!(list, [only] if only.mechanism == MechanismType::Ipsec3gpp)
}
