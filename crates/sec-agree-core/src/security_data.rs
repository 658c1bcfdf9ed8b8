//! Negotiation data owned by one security-agreement
//!
//! Holds the local and remote mechanism lists, the selected mechanism, auth
//! and IPsec key material and the CSeq of the negotiating transaction. All
//! mutation happens under the owning agreement's object lock.

use tracing::debug;

use crate::errors::{SecAgreeError, SecAgreeResult};
use crate::types::{
    AuthChallenge, InsertClientList, IpsecInfo, MechanismType, Role, SecurityHeader,
};

/// Mechanism in use together with the headers it was chosen from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedSecurity {
    pub mechanism: MechanismType,
    pub local: Option<SecurityHeader>,
    pub remote: Option<SecurityHeader>,
}

impl SelectedSecurity {
    pub fn new(mechanism: MechanismType) -> Self {
        Self { mechanism, local: None, remote: None }
    }
}

/// Which list a header goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Local,
    Remote,
    TispanLocal,
}

/// Per-agreement security data
#[derive(Debug, Clone, Default)]
pub struct SecurityData {
    pub(crate) local_list: Vec<SecurityHeader>,
    pub(crate) remote_list: Vec<SecurityHeader>,
    pub(crate) tispan_local_snapshot: Option<Vec<SecurityHeader>>,
    pub(crate) selected: Option<SelectedSecurity>,
    pub(crate) server_challenge: Option<AuthChallenge>,
    pub(crate) client_challenges: Vec<AuthChallenge>,
    pub(crate) ipsec_info: Option<IpsecInfo>,
    pub(crate) cseq_step: u32,
    pub(crate) insert_client_list: InsertClientList,
}

impl SecurityData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_list(&self) -> &[SecurityHeader] {
        &self.local_list
    }

    pub fn remote_list(&self) -> &[SecurityHeader] {
        &self.remote_list
    }

    pub fn tispan_local_snapshot(&self) -> Option<&[SecurityHeader]> {
        self.tispan_local_snapshot.as_deref()
    }

    pub fn selected(&self) -> Option<&SelectedSecurity> {
        self.selected.as_ref()
    }

    pub fn selected_mechanism(&self) -> Option<MechanismType> {
        self.selected.as_ref().map(|s| s.mechanism)
    }

    pub fn cseq_step(&self) -> u32 {
        self.cseq_step
    }

    pub fn local_header(&self, mechanism: MechanismType) -> Option<&SecurityHeader> {
        self.local_list.iter().find(|h| h.mechanism == mechanism)
    }

    pub(crate) fn local_header_mut(&mut self, mechanism: MechanismType) -> Option<&mut SecurityHeader> {
        self.local_list.iter_mut().find(|h| h.mechanism == mechanism)
    }

    /// First header of `mechanism` in the remote list
    pub fn remote_header(&self, mechanism: MechanismType) -> Option<&SecurityHeader> {
        self.remote_list.iter().find(|h| h.mechanism == mechanism)
    }

    pub fn client_challenges(&self) -> &[AuthChallenge] {
        &self.client_challenges
    }

    pub fn ipsec_info(&self) -> Option<&IpsecInfo> {
        self.ipsec_info.as_ref()
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut Vec<SecurityHeader> {
        match kind {
            ListKind::Local => &mut self.local_list,
            ListKind::Remote => &mut self.remote_list,
            ListKind::TispanLocal => self.tispan_local_snapshot.get_or_insert_with(Vec::new),
        }
    }

    /// Append a header to a list
    ///
    /// The local list holds at most one header per mechanism.
    pub fn push_header(&mut self, kind: ListKind, header: SecurityHeader) -> SecAgreeResult<()> {
        if kind == ListKind::Local {
            if header.mechanism == MechanismType::Other {
                return Err(SecAgreeError::illegal_action(
                    "local security list only accepts known mechanisms",
                ));
            }
            if self.local_list.iter().any(|h| h.mechanism == header.mechanism) {
                return Err(SecAgreeError::illegal_action(format!(
                    "local security list already holds a {} header",
                    header.mechanism
                )));
            }
        }
        self.list_mut(kind).push(header);
        Ok(())
    }

    /// Remove the local header of `mechanism`
    pub fn remove_local_header(&mut self, mechanism: MechanismType) -> SecAgreeResult<SecurityHeader> {
        let position = self
            .local_list
            .iter()
            .position(|h| h.mechanism == mechanism)
            .ok_or_else(|| {
                SecAgreeError::not_found(format!("no {} header in the local list", mechanism))
            })?;
        Ok(self.local_list.remove(position))
    }

    /// Replace the remote list with the headers of a received message
    pub fn load_remote_list(&mut self, headers: &[SecurityHeader]) {
        self.remote_list = headers.to_vec();
    }

    pub fn clear_local_list(&mut self) {
        self.local_list.clear();
    }

    /// Drop data only needed while negotiating
    pub fn reset_negotiation(&mut self) {
        self.cseq_step = 0;
        self.tispan_local_snapshot = None;
    }

    /// Copy the local part of `source` for a renegotiation
    ///
    /// Local and TISPAN lists are copied without `spi-c`, `spi-s` and
    /// `port-c`; `port-s` is kept only when `keep_port_s` is set. On failure
    /// every list touched so far is restored.
    pub fn copy_from(
        &mut self,
        source: &SecurityData,
        role: Role,
        gm_interface: bool,
        keep_port_s: bool,
    ) -> SecAgreeResult<()> {
        let saved_local = std::mem::take(&mut self.local_list);
        let saved_tispan = self.tispan_local_snapshot.take();
        let saved_challenge = self.server_challenge.clone();
        let copy_remote = role == Role::Client && self.remote_list.is_empty() && gm_interface;

        let result = (|| -> SecAgreeResult<()> {
            for header in &source.local_list {
                self.push_header(ListKind::Local, strip_negotiated(header, keep_port_s))?;
            }
            if copy_remote {
                for header in &source.remote_list {
                    self.push_header(ListKind::Remote, header.clone())?;
                }
            }
            if role == Role::Server && gm_interface && !source.local_list.is_empty() {
                // compared as-is against the client's first Security-Verify
                self.tispan_local_snapshot = Some(source.local_list.clone());
            }
            if role == Role::Server {
                if let Some(challenge) = &source.server_challenge {
                    self.server_challenge = Some(challenge.clone());
                }
            }
            Ok(())
        })();

        if let Err(e) = result {
            debug!("security data copy failed, rolling back: {}", e);
            self.local_list = saved_local;
            self.tispan_local_snapshot = saved_tispan;
            self.server_challenge = saved_challenge;
            if copy_remote {
                self.remote_list.clear();
            }
            return Err(e);
        }
        Ok(())
    }
}

fn strip_negotiated(header: &SecurityHeader, keep_port_s: bool) -> SecurityHeader {
    let mut copy = header.clone();
    copy.spi_c = None;
    copy.spi_s = None;
    copy.port_c = None;
    if !keep_port_s {
        copy.port_s = None;
    }
    copy
}
