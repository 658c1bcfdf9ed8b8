//! Drives an agreement's secure channel alongside the state machine
//!
//! [`update_channel`] runs under the agreement's object lock before the
//! matching state transition is applied. It constructs the channel ahead of
//! the negotiation, activates it once both sides are known and tears it down
//! when the negotiation ends up with a mechanism the channel does not carry.

use std::sync::Arc;
use tracing::{debug, warn};

use super::secure_channel::{IpsecLocalParams, IpsecPeerParams, IpsecRemoteParams, SecureChannel, TlsParams};
use crate::agreement::sec_agree::{AgreementDeps, SecAgreeInner};
use crate::errors::SecAgreeResult;
use crate::events::QueuedEvent;
use crate::state::{client_is_choosing, should_activate_channel, should_construct_channel, ProcessingEvent, StatusTrigger};
use crate::types::{MechanismType, Role, SecAgreeState, SecurityHeader};

/// Mechanisms the agreement's channel was built for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ChannelMechanisms {
    pub(crate) ipsec: bool,
    pub(crate) tls: bool,
}

impl ChannelMechanisms {
    pub(crate) fn any(self) -> bool {
        self.ipsec || self.tls
    }

    fn handles(self, mechanism: Option<MechanismType>) -> bool {
        match mechanism {
            None => true,
            Some(MechanismType::Ipsec3gpp) => self.ipsec,
            Some(MechanismType::Tls) => self.tls,
            Some(_) => false,
        }
    }
}

/// Bring the secure channel in line with `event`
pub(crate) fn update_channel(
    inner: &mut SecAgreeInner,
    deps: &AgreementDeps,
    event: &ProcessingEvent,
) -> SecAgreeResult<()> {
    let selected = inner.data.selected_mechanism();
    let mut constructed = false;

    if inner.channel.is_none()
        && deps.capabilities.channel_handles_selection(selected)
        && should_construct_channel(inner.state, event)
    {
        constructed = construct(inner, deps, event)?;
    }

    let handled = inner.channel.is_some() && inner.channel_mechanisms.handles(selected);

    if inner.role == Role::Client && *event == ProcessingEvent::SetSecurity && handled {
        if let (Some(channel), Some(mechanism)) = (&inner.channel, selected) {
            channel.set_mechanism(mechanism)?;
        }
    }

    if handled && should_activate_channel(inner.state, event) {
        if let Err(e) = activate(inner, deps) {
            warn!("security-agreement {}: secure channel activation failed: {}", inner.handle, e);
            if constructed {
                drop_channel(inner);
            }
            return Err(e);
        }
    }

    if *event == ProcessingEvent::SetSecurity && handled {
        supply(inner, deps)?;
    }

    let ended_without_channel = matches!(event, ProcessingEvent::MsgReceived(_) | ProcessingEvent::DestResolved { .. })
        && inner.state == SecAgreeState::NoAgreementRequired;
    let unhandled_choice = *event == ProcessingEvent::SetSecurity && selected.is_some() && !handled;
    if inner.channel.is_some() && (unhandled_choice || ended_without_channel) {
        debug!("security-agreement {}: secure channel not needed, terminating it", inner.handle);
        drop_channel(inner);
    }
    Ok(())
}

fn construct(inner: &mut SecAgreeInner, deps: &AgreementDeps, event: &ProcessingEvent) -> SecAgreeResult<bool> {
    let selected = inner.data.selected_mechanism();
    let mechanisms = ChannelMechanisms {
        ipsec: deps.capabilities.channel_handles(MechanismType::Ipsec3gpp)
            && inner.data.local_header(MechanismType::Ipsec3gpp).is_some(),
        tls: deps.capabilities.channel_handles(MechanismType::Tls)
            && (inner.data.local_header(MechanismType::Tls).is_some()
                || (client_is_choosing(inner.state, event, selected)
                    && inner.data.remote_header(MechanismType::Tls).is_some())),
    };
    if !mechanisms.any() {
        return Ok(false);
    }

    let channel = deps.factory.construct(inner.handle)?;
    debug!(
        "security-agreement {}: constructed secure channel {} (ipsec: {}, tls: {})",
        inner.handle,
        channel.id(),
        mechanisms.ipsec,
        mechanisms.tls
    );

    if let Err(e) = prepare(inner, &channel, mechanisms) {
        if let Err(term) = channel.terminate() {
            warn!("secure channel {} did not terminate: {}", channel.id(), term);
        }
        return Err(e);
    }

    inner.channel = Some(channel);
    inner.channel_mechanisms = mechanisms;
    Ok(true)
}

fn prepare(inner: &mut SecAgreeInner, channel: &Arc<dyn SecureChannel>, mechanisms: ChannelMechanisms) -> SecAgreeResult<()> {
    if let Some(context) = &inner.context {
        channel.set_context(context)?;
    }
    if mechanisms.ipsec {
        if let Some(header) = inner.data.local_header(MechanismType::Ipsec3gpp) {
            channel.set_local_ipsec_params(&IpsecLocalParams {
                algorithm: header.algorithm,
                encrypt_algorithm: header.encrypt_algorithm,
                local_ip: inner.endpoints.local_ipsec_ip,
                peer: IpsecPeerParams::from_header(header),
            })?;
        }
    }
    channel.initiate()?;

    if mechanisms.ipsec {
        let allocated = channel.local_ipsec_params()?;
        if let Some(header) = inner.data.local_header_mut(MechanismType::Ipsec3gpp) {
            allocated.apply_to(header);
        }
    }
    Ok(())
}

fn remote_ipsec_header(inner: &SecAgreeInner) -> Option<SecurityHeader> {
    match inner.data.selected() {
        Some(selected) if selected.remote.is_some() => selected.remote.clone(),
        _ => inner.data.remote_header(MechanismType::Ipsec3gpp).cloned(),
    }
}

fn activate(inner: &mut SecAgreeInner, deps: &AgreementDeps) -> SecAgreeResult<()> {
    let Some(channel) = inner.channel.clone() else {
        return Ok(());
    };
    let selected = inner.data.selected_mechanism();

    let mut ipsec_set = false;
    if inner.channel_mechanisms.ipsec && matches!(selected, None | Some(MechanismType::Ipsec3gpp)) {
        if let Some(remote) = remote_ipsec_header(inner) {
            let info = inner.data.ipsec_info();
            channel.set_remote_ipsec_params(&IpsecRemoteParams {
                remote: inner.endpoints.remote_ipsec,
                transport: inner.endpoints.remote_ipsec_transport,
                peer: IpsecPeerParams::from_header(&remote),
                ik: info.map(|i| i.ik.clone()).unwrap_or_default(),
                ck: info.map(|i| i.ck.clone()).unwrap_or_default(),
                lifetime: info.and_then(|i| i.lifetime),
            })?;
            ipsec_set = true;
        }
    }
    if selected == Some(MechanismType::Tls) {
        if let Some(remote) = inner.endpoints.remote_tls {
            channel.set_tls_params(&TlsParams { local: inner.endpoints.local_tls, remote })?;
        }
    }

    channel.activate()?;
    debug!("security-agreement {}: activated secure channel {}", inner.handle, channel.id());
    if ipsec_set {
        inner.update_status(deps, StatusTrigger::IpsecActivation)?;
    }
    Ok(())
}

fn supply(inner: &mut SecAgreeInner, deps: &AgreementDeps) -> SecAgreeResult<()> {
    let selected = inner.data.selected_mechanism();
    if inner.role == Role::Server {
        if let (Some(channel), Some(mechanism)) = (&inner.channel, selected) {
            channel.set_mechanism(mechanism)?;
        }
    }
    if selected != Some(MechanismType::Ipsec3gpp) {
        inner.endpoints.clear_local_ipsec();
    }
    deps.queue.push(QueuedEvent::SupplyChannel { handle: inner.handle })
}

fn drop_channel(inner: &mut SecAgreeInner) {
    if let Some(channel) = inner.channel.take() {
        if let Err(e) = channel.terminate() {
            warn!("secure channel {} did not terminate: {}", channel.id(), e);
        }
    }
    inner.channel_mechanisms = ChannelMechanisms::default();
}
