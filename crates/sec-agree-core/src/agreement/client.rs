//! Client side of the negotiation
//!
//! The client offers its local list in Security-Client, learns the server's
//! list from a 494/401/407 response, picks a mechanism and echoes the
//! server list in Security-Verify on every later request.

use std::net::SocketAddr;
use tracing::{debug, info, warn};

use super::sec_agree::{AgreementDeps, SecAgreeInner, SecAgreement};
use super::ReceivedOutcome;
use crate::channel::coordinator;
use crate::channel::ChannelState;
use crate::errors::{SecAgreeError, SecAgreeResult};
use crate::message::{InboundMessage, OutboundMessage};
use crate::security_data::SelectedSecurity;
use crate::selection::{self, IpsecConstraints};
use crate::state::{ProcessingEvent, ReceivedSummary, StatusTrigger};
use crate::types::{InsertClientList, MechanismType, Reason, Role, SecAgreeState, TransportType};

fn ensure_client(inner: &SecAgreeInner, operation: &str) -> SecAgreeResult<()> {
    if inner.role != Role::Client {
        return Err(SecAgreeError::illegal_action(format!(
            "{} is only allowed on client agreements ({} is {})",
            operation, inner.handle, inner.role
        )));
    }
    Ok(())
}

/// Automatic choice over the local and remote lists
fn compute_choice(inner: &SecAgreeInner, deps: &AgreementDeps) -> Option<SelectedSecurity> {
    let local = inner.data.local_list();
    let remote = inner.data.remote_list();
    let choice = selection::choose_mechanism(local, remote, &deps.capabilities)?;
    Some(SelectedSecurity {
        mechanism: choice.mechanism,
        local: Some(local[choice.local_index].clone()),
        remote: Some(remote[choice.remote_index].clone()),
    })
}

/// Digest needs a Proxy-Authenticate challenge from the server
fn check_security(inner: &SecAgreeInner, mechanism: MechanismType) -> bool {
    match mechanism {
        MechanismType::Digest => !inner.data.client_challenges().is_empty(),
        _ => true,
    }
}

/// Whether the addresses needed by `mechanism` are known
fn can_activate(inner: &SecAgreeInner, mechanism: MechanismType) -> bool {
    let endpoints = &inner.endpoints;
    match mechanism {
        MechanismType::Tls => endpoints.remote_tls.is_some() && endpoints.local_tls.is_some(),
        MechanismType::Ipsec3gpp => {
            endpoints.remote_ipsec.is_some()
                && endpoints.remote_ipsec_transport.is_some()
                && endpoints.local_ipsec_ip.is_some()
        }
        _ => true,
    }
}

fn application_choice(inner: &SecAgreeInner, deps: &AgreementDeps, mechanism: MechanismType) -> SecAgreeResult<SelectedSecurity> {
    if !deps.capabilities.supports(mechanism) {
        return Err(SecAgreeError::illegal_action(format!(
            "{} cannot choose unsupported mechanism {}",
            inner.handle, mechanism
        )));
    }
    info!("security-agreement {} setting mechanism {}", inner.handle, mechanism);

    let local = if inner.state == SecAgreeState::ClientChooseSecurity {
        let list = inner.data.local_list();
        selection::find_best_header(list, mechanism, &IpsecConstraints::default()).map(|i| list[i].clone())
    } else {
        None
    };

    let constraints = match (mechanism, &local) {
        (MechanismType::Ipsec3gpp, Some(header)) => IpsecConstraints::from_header(header),
        (MechanismType::Ipsec3gpp, None) => {
            return Err(SecAgreeError::illegal_action(format!(
                "{} cannot choose ipsec-3gpp without a local ipsec-3gpp offer",
                inner.handle
            )));
        }
        _ => IpsecConstraints::default(),
    };

    let remote_list = inner.data.remote_list();
    let remote = selection::find_best_header(remote_list, mechanism, &constraints)
        .map(|i| remote_list[i].clone())
        .ok_or_else(|| {
            SecAgreeError::illegal_action(format!(
                "no remote {} header matches the choice of {}",
                mechanism, inner.handle
            ))
        })?;

    Ok(SelectedSecurity { mechanism, local, remote: Some(remote) })
}

impl SecAgreement {
    /// The mechanism chosen so far
    ///
    /// While the client is still choosing and nothing is stored, the
    /// automatic choice is computed and stored when it is usable.
    pub fn client_get_chosen_security(&self) -> SecAgreeResult<Option<SelectedSecurity>> {
        self.with_api(|inner, deps| {
            ensure_client(inner, "client_get_chosen_security")?;
            let lists_ready =
                !inner.data.local_list().is_empty() && !inner.data.remote_list().is_empty();
            if inner.state.can_choose_security() && lists_ready && inner.data.selected().is_none() {
                if let Some(choice) = compute_choice(inner, deps) {
                    if check_security(inner, choice.mechanism) {
                        inner.data.selected = Some(choice);
                    }
                }
            }
            Ok(inner.data.selected().cloned())
        })
    }

    /// Commit the mechanism to use and activate the agreement
    ///
    /// With `None` the stored or automatic choice is used. Returns the
    /// committed selection.
    pub fn client_set_chosen_security(&self, mechanism: Option<MechanismType>) -> SecAgreeResult<SelectedSecurity> {
        self.with_api(|inner, deps| {
            ensure_client(inner, "client_set_chosen_security")?;
            if !inner.state.can_choose_security() {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} cannot choose security in state {}",
                    inner.handle, inner.state
                )));
            }

            let chosen = match mechanism {
                None => match inner.data.selected() {
                    Some(stored) if stored.local.is_some() && stored.remote.is_some() => stored.clone(),
                    _ => compute_choice(inner, deps).ok_or_else(|| {
                        SecAgreeError::illegal_action(format!(
                            "{} has no mechanism in common with the server",
                            inner.handle
                        ))
                    })?,
                },
                Some(mechanism) => application_choice(inner, deps, mechanism)?,
            };

            if !check_security(inner, chosen.mechanism) {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} chose digest but the server sent no challenge",
                    inner.handle
                )));
            }
            if !can_activate(inner, chosen.mechanism) {
                return Err(SecAgreeError::illegal_action(format!(
                    "{}: addresses for {} are incomplete",
                    inner.handle, chosen.mechanism
                )));
            }

            let previous = inner.data.selected.replace(chosen.clone());
            if let Err(e) = coordinator::update_channel(inner, deps, &ProcessingEvent::SetSecurity) {
                warn!("security-agreement {}: secure channel setup failed: {}", inner.handle, e);
                inner.data.selected = previous;
                return Err(e);
            }
            inner.progress(deps, &ProcessingEvent::SetSecurity);
            Ok(chosen)
        })
    }

    /// Go back to ClientLocalListReady after an aborted first request
    pub fn client_return_to_local_list_ready(&self) -> SecAgreeResult<()> {
        self.with_api(|inner, deps| {
            ensure_client(inner, "client_return_to_local_list_ready")?;
            if inner.data.local_list().is_empty() || !inner.data.remote_list().is_empty() {
                return Err(SecAgreeError::illegal_action(format!(
                    "{}: local list must be set and remote list empty",
                    inner.handle
                )));
            }
            let needs_channel = inner.data.local_header(MechanismType::Tls).is_some()
                || inner.data.local_header(MechanismType::Ipsec3gpp).is_some();
            if needs_channel {
                let initiated = inner
                    .channel
                    .as_ref()
                    .is_some_and(|c| c.state() == ChannelState::Initiated);
                if !initiated {
                    return Err(SecAgreeError::illegal_action(format!(
                        "{}: secure channel is not initiated",
                        inner.handle
                    )));
                }
            }
            inner.change_state(deps, SecAgreeState::ClientLocalListReady, Reason::Undefined);
            Ok(())
        })
    }

    /// Force Security-Client into the next request, even when Active
    pub fn client_set_add_security_client(&self, add: bool) -> SecAgreeResult<()> {
        self.with_api(|inner, _| {
            ensure_client(inner, "client_set_add_security_client")?;
            inner.data.insert_client_list = if add { InsertClientList::ByApp } else { InsertClientList::Never };
            Ok(())
        })
    }

    pub fn client_add_security_client(&self) -> SecAgreeResult<bool> {
        self.with_api(|inner, _| {
            ensure_client(inner, "client_add_security_client")?;
            Ok(inner.data.insert_client_list != InsertClientList::Never)
        })
    }

    /// Insert the client's security headers into a message about to be sent
    pub fn client_message_to_send(&self, msg: &mut OutboundMessage) -> SecAgreeResult<()> {
        self.with_event(|inner, deps| {
            client_message_to_send(inner, deps, msg);
            Ok(())
        })
    }

    /// The transport picked a destination for a message of this agreement
    pub fn client_dest_resolved(
        &self,
        msg: &mut OutboundMessage,
        transport: TransportType,
        remote: SocketAddr,
    ) -> SecAgreeResult<()> {
        self.with_event(|inner, deps| client_dest_resolved(inner, deps, msg, transport, remote))
    }

    /// Load the server's list from a received response
    pub fn client_message_received(&self, msg: &InboundMessage, replacement: bool) -> SecAgreeResult<ReceivedOutcome> {
        self.with_event(|inner, deps| client_receive(inner, deps, msg, replacement))
    }

    /// A message of this agreement could not be sent
    pub fn message_send_failure(&self) -> SecAgreeResult<()> {
        self.with_event(|inner, deps| {
            if inner.state.is_valid() {
                inner.invalidate(deps, Reason::MsgSendFailure);
            }
            Ok(())
        })
    }
}

fn should_insert_client_list(inner: &SecAgreeInner) -> bool {
    if inner.data.local_list().is_empty() {
        return false;
    }
    match inner.data.insert_client_list {
        _ if inner.state != SecAgreeState::Active => true,
        InsertClientList::ByApp => true,
        InsertClientList::ByIpsec => inner.data.selected_mechanism() == Some(MechanismType::Ipsec3gpp),
        InsertClientList::Never => false,
    }
}

fn client_message_to_send(inner: &mut SecAgreeInner, deps: &AgreementDeps, msg: &mut OutboundMessage) {
    if !msg.can_be_part_of_negotiation()
        || !inner.state.is_valid()
        || !inner.state.should_process_message_to_send(inner.role)
    {
        return;
    }

    let mut inserted = false;
    if should_insert_client_list(inner) {
        msg.security.security_client = inner.data.local_list().to_vec();
        inner.data.cseq_step = msg.cseq_step;
        inserted = true;
    }

    if inner.state == SecAgreeState::Active {
        msg.security.security_verify = inner.data.remote_list().to_vec();
        if inner.data.selected_mechanism() == Some(MechanismType::Digest) {
            msg.security.authorization_challenges = inner.data.client_challenges().to_vec();
        }
        inserted = true;

        if inner.data.insert_client_list == InsertClientList::ByIpsec {
            inner.data.insert_client_list = InsertClientList::Never;
        }
    }

    if inserted {
        msg.security.require_sec_agree = true;
        msg.security.proxy_require_sec_agree = true;
    }

    let event = ProcessingEvent::MsgToSend { has_secure_channel: inner.channel.is_some() };
    inner.progress(deps, &event);
}

fn client_dest_resolved(
    inner: &mut SecAgreeInner,
    deps: &AgreementDeps,
    msg: &mut OutboundMessage,
    transport: TransportType,
    remote: SocketAddr,
) -> SecAgreeResult<()> {
    if !msg.can_be_part_of_negotiation() || !inner.state.should_process_dest_resolved() {
        return Ok(());
    }
    if !inner.endpoints.has_remote_for(transport) {
        inner.endpoints.set_remote_for(transport, remote);
    }
    if transport == TransportType::Tls {
        debug!("security-agreement {}: TLS destination, no agreement headers", inner.handle);
        msg.security.clear();
    }

    let event = ProcessingEvent::DestResolved { transport: Some(transport) };
    inner.progress(deps, &event);
    coordinator::update_channel(inner, deps, &event)
}

fn client_receive(
    inner: &mut SecAgreeInner,
    deps: &AgreementDeps,
    msg: &InboundMessage,
    replacement: bool,
) -> SecAgreeResult<ReceivedOutcome> {
    if !msg.can_be_part_of_negotiation() {
        let same_transaction = inner.data.cseq_step() == msg.cseq_step || inner.data.cseq_step() == 0;
        if same_transaction && inner.state.client_awaits_remote_list() && msg.is_final_response() {
            inner.invalidate(deps, Reason::ResponseMissing);
        } else if let Some(code) = msg.status_code {
            inner.consider_status(deps, StatusTrigger::ResponseReceived(code));
        }
        return Ok(ReceivedOutcome::Processed);
    }
    if !inner.state.should_process_received_message() {
        return Ok(ReceivedOutcome::Processed);
    }

    let can_load = inner.state.can_load_remote_list();
    if replacement && (inner.role != Role::Client || !can_load) {
        inner.invalidate(deps, Reason::Undefined);
        return Err(SecAgreeError::illegal_action(format!(
            "replacement agreement {} cannot take the Security-Server list in state {}",
            inner.handle, inner.state
        )));
    }

    let has_server_list = !msg.security_server.is_empty();
    if !can_load && has_server_list {
        if inner.state.is_valid() {
            inner.invalidate(deps, Reason::SecurityServerRcvd);
        }
        return Ok(ReceivedOutcome::ReplacementRequired);
    }

    if has_server_list {
        inner.data.load_remote_list(&msg.security_server);
        if msg.offers_digest() {
            inner.data.client_challenges = msg.challenges.clone();
        }
    } else if inner.state.client_awaits_remote_list() && inner.data.cseq_step() == msg.cseq_step {
        inner.invalidate(deps, Reason::ResponseMissing);
        return Ok(ReceivedOutcome::Processed);
    }

    let event = ProcessingEvent::MsgReceived(ReceivedSummary {
        remote_list_present: has_server_list,
        local_list_present: false,
        transport: msg.transport,
        option_tag_present: msg.require_sec_agree || msg.supported_sec_agree,
    });
    inner.progress(deps, &event);
    Ok(ReceivedOutcome::Processed)
}
