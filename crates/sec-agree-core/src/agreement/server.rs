//! Server side of the negotiation

use tracing::{debug, info};

use super::sec_agree::{AgreementDeps, SecAgreeInner, SecAgreement};
use super::ReceivedOutcome;
use crate::channel::coordinator;
use crate::channel::ChannelState;
use crate::errors::{SecAgreeError, SecAgreeResult};
use crate::message::{InboundMessage, OutboundMessage};
use crate::security_data::SelectedSecurity;
use crate::selection;
use crate::state::{ProcessingEvent, ReceivedSummary, StatusTrigger};
use crate::types::{
    lists_match, AuthChallenge, MechanismType, Reason, Role, SecAgreeState, TransportType,
    RESPONSE_BAD_GATEWAY,
};

fn ensure_server(inner: &SecAgreeInner, operation: &str) -> SecAgreeResult<()> {
    if inner.role != Role::Server {
        return Err(SecAgreeError::illegal_action(format!(
            "{} is only allowed on server agreements ({} is {})",
            operation, inner.handle, inner.role
        )));
    }
    Ok(())
}

impl SecAgreement {
    /// Challenge sent as Proxy-Authenticate with the Security-Server list
    pub fn set_server_challenge(&self, challenge: AuthChallenge) -> SecAgreeResult<()> {
        self.with_api(|inner, _| {
            ensure_server(inner, "set_server_challenge")?;
            inner.data.server_challenge = Some(challenge);
            Ok(())
        })
    }

    pub fn server_challenge(&self) -> SecAgreeResult<Option<AuthChallenge>> {
        self.with_api(|inner, _| Ok(inner.data.server_challenge.clone()))
    }

    /// Move back to Active once the secure channel is up again
    pub fn server_return_to_active(&self) -> SecAgreeResult<()> {
        self.with_api(|inner, deps| {
            ensure_server(inner, "server_return_to_active")?;
            let active = inner
                .channel
                .as_ref()
                .is_some_and(|c| c.state() == ChannelState::Active);
            if !active {
                return Err(SecAgreeError::illegal_action(format!(
                    "{}: secure channel is not active",
                    inner.handle
                )));
            }
            inner.change_state(deps, SecAgreeState::Active, Reason::Undefined);
            Ok(())
        })
    }

    /// Select ipsec-3gpp on an Active server without waiting for a request
    pub fn server_force_ipsec_security(&self) -> SecAgreeResult<()> {
        self.with_api(|inner, deps| {
            ensure_server(inner, "server_force_ipsec_security")?;
            if inner.state != SecAgreeState::Active {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} is not active",
                    inner.handle
                )));
            }
            if inner.data.selected().is_some() {
                return Ok(());
            }
            if !selection::is_single_ipsec(inner.data.local_list()) {
                return Err(SecAgreeError::illegal_action(format!(
                    "{}: local list must be a single ipsec-3gpp header",
                    inner.handle
                )));
            }

            let mut chosen = SelectedSecurity::new(MechanismType::Ipsec3gpp);
            chosen.local = inner.data.local_header(MechanismType::Ipsec3gpp).cloned();
            inner.data.selected = Some(chosen);
            if let Err(e) = coordinator::update_channel(inner, deps, &ProcessingEvent::SetSecurity) {
                inner.data.selected = None;
                return Err(e);
            }
            info!("security-agreement {}: ipsec-3gpp forced", inner.handle);
            Ok(())
        })
    }

    /// Process the security headers of a received request
    pub fn server_message_received(&self, msg: &InboundMessage, replacement: bool) -> SecAgreeResult<ReceivedOutcome> {
        self.with_event(|inner, deps| server_receive(inner, deps, msg, replacement))
    }

    /// Insert the server's security headers into a response about to be sent
    pub fn server_message_to_send(&self, msg: &mut OutboundMessage) -> SecAgreeResult<()> {
        self.with_event(|inner, deps| {
            server_message_to_send(inner, deps, msg);
            Ok(())
        })
    }
}

/// Whether Security-Verify is compared, and against the TISPAN snapshot
fn should_compare_local(inner: &SecAgreeInner) -> (bool, bool) {
    if inner.state == SecAgreeState::Active {
        return (true, false);
    }
    let negotiating = matches!(
        inner.state,
        SecAgreeState::Idle
            | SecAgreeState::ServerLocalListReady
            | SecAgreeState::ServerRemoteListReady
            | SecAgreeState::ServerReady
    );
    let tispan = negotiating && inner.is_gm_interface() && inner.data.tispan_local_snapshot().is_some();
    (tispan, tispan)
}

fn replacement_rejected(inner: &mut SecAgreeInner, deps: &AgreementDeps) -> SecAgreeError {
    inner.invalidate(deps, Reason::Undefined);
    SecAgreeError::illegal_action(format!(
        "replacement agreement {} cannot take the request in state {}",
        inner.handle, inner.state
    ))
}

fn server_receive(
    inner: &mut SecAgreeInner,
    deps: &AgreementDeps,
    msg: &InboundMessage,
    replacement: bool,
) -> SecAgreeResult<ReceivedOutcome> {
    if !msg.is_negotiable_request() || !inner.state.should_process_received_message() {
        return Ok(ReceivedOutcome::Processed);
    }
    if inner.owners.is_empty() {
        return Err(SecAgreeError::illegal_action(format!(
            "{} has no owner to process the request",
            inner.handle
        )));
    }

    if msg.via_count > 1 && msg.require_sec_agree {
        debug!("security-agreement {}: sec-agree request crossed a proxy", inner.handle);
        inner.response_code = Some(RESPONSE_BAD_GATEWAY);
        return Ok(ReceivedOutcome::Processed);
    }
    let option_tag = msg.require_sec_agree || msg.supported_sec_agree;

    let initial = matches!(inner.state, SecAgreeState::Idle | SecAgreeState::ServerLocalListReady);
    if initial && msg.transport == Some(TransportType::Tls) && !msg.require_sec_agree {
        let event = ProcessingEvent::MsgReceived(ReceivedSummary {
            transport: msg.transport,
            option_tag_present: option_tag,
            ..Default::default()
        });
        inner.progress(deps, &event);
        coordinator::update_channel(inner, deps, &event)?;
        return Ok(ReceivedOutcome::Processed);
    }

    let has_client = !msg.security_client.is_empty();
    let has_verify = !msg.security_verify.is_empty();
    let can_load = inner.state.can_load_remote_list();
    let compare_client = inner.state.should_compare_remote_list();
    let (mut compare_verify, tispan) = should_compare_local(inner);

    if replacement && (inner.role != Role::Server || (has_client && !can_load && !compare_client)) {
        return Err(replacement_rejected(inner, deps));
    }

    let equal_client = !has_client || lists_match(inner.data.remote_list(), &msg.security_client);
    let stored_verify = if tispan {
        inner.data.tispan_local_snapshot().unwrap_or_default()
    } else {
        inner.data.local_list()
    };
    let equal_verify = lists_match(stored_verify, &msg.security_verify);

    if compare_client && !equal_client {
        if compare_verify && !equal_verify && (has_verify || inner.is_gm_interface()) {
            info!("security-agreement {}: Security-Verify does not match", inner.handle);
            inner.invalidate(deps, Reason::SecurityVerifyMismatch);
            return Ok(ReceivedOutcome::Processed);
        }
        info!("security-agreement {}: Security-Client does not match", inner.handle);
        compare_verify = false;
        inner.invalidate(deps, Reason::SecurityClientMismatch);
    }

    if has_client && ((compare_client && !equal_client) || (!compare_client && !can_load)) {
        if replacement {
            return Err(replacement_rejected(inner, deps));
        }
        if inner.state.is_valid() {
            inner.invalidate(deps, Reason::SecurityClientRcvd);
        }
        return Ok(ReceivedOutcome::ReplacementRequired);
    }

    let mut loaded = false;
    if has_client && can_load {
        inner.data.load_remote_list(&msg.security_client);
        inner.data.cseq_step = msg.cseq_step;
        loaded = true;
    }

    if compare_verify && !equal_verify {
        info!("security-agreement {}: Security-Verify does not match", inner.handle);
        inner.invalidate(deps, Reason::SecurityVerifyMismatch);
        return Ok(ReceivedOutcome::Processed);
    }

    if let (Some(transport), Some(from)) = (msg.transport, msg.received_from) {
        if transport.is_ipsec_carrier() && inner.endpoints.remote_ipsec.is_none() {
            inner.endpoints.remote_ipsec = Some(from);
            inner.endpoints.remote_ipsec_transport = Some(transport);
        }
    }

    let event = ProcessingEvent::MsgReceived(ReceivedSummary {
        remote_list_present: loaded,
        local_list_present: has_verify,
        transport: msg.transport,
        option_tag_present: option_tag,
    });
    coordinator::update_channel(inner, deps, &event)?;

    if inner.state == SecAgreeState::Active && inner.data.selected().is_none() {
        let mechanism = match (&inner.channel, msg.transport) {
            (Some(_), Some(TransportType::Tls)) => MechanismType::Tls,
            (Some(_), Some(t)) if t.is_ipsec_carrier() && msg.over_secure_channel => MechanismType::Ipsec3gpp,
            _ => MechanismType::Digest,
        };
        debug!("security-agreement {}: client is using {}", inner.handle, mechanism);
        let mut chosen = SelectedSecurity::new(mechanism);
        chosen.local = inner.data.local_header(mechanism).cloned();
        chosen.remote = inner.data.remote_header(mechanism).cloned();
        inner.data.selected = Some(chosen);
        coordinator::update_channel(inner, deps, &ProcessingEvent::SetSecurity)?;
    }

    inner.progress(deps, &event);
    Ok(ReceivedOutcome::Processed)
}

fn server_message_to_send(inner: &mut SecAgreeInner, deps: &AgreementDeps, msg: &mut OutboundMessage) {
    if !msg.is_negotiation_response() {
        if let Some(code) = msg.status_code {
            inner.consider_status(deps, StatusTrigger::ResponseToSend(code));
        }
        return;
    }
    if !inner.state.is_valid() || !inner.state.should_process_message_to_send(inner.role) {
        return;
    }
    let cseq = inner.data.cseq_step();
    if cseq != 0 && cseq != msg.cseq_step {
        return;
    }

    msg.security.security_server = inner.data.local_list().to_vec();
    msg.security.proxy_authenticate = inner.data.server_challenge.clone();
    msg.security.require_sec_agree = true;

    let event = ProcessingEvent::MsgToSend { has_secure_channel: inner.channel.is_some() };
    inner.progress(deps, &event);
}
