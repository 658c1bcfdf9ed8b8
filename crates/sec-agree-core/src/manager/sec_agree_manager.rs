//! The security-agreement manager
//!
//! Owns the agreement arena, the owner index and the event queue, and is
//! the only place that calls out to the application and to owners. Every
//! callout happens from [`SecAgreeManager::dispatch_pending`] (or the task
//! started by [`SecAgreeManager::spawn_dispatcher`]) with no agreement lock
//! held.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::arena::AgreementArena;
use crate::agreement::sec_agree::AgreementDeps;
use crate::agreement::{ReceivedOutcome, SecAgreement};
use crate::channel::{ChannelState, ChannelStatus, SecureChannelFactory};
use crate::config::{Capabilities, SecAgreeConfig};
use crate::errors::{SecAgreeError, SecAgreeResult};
use crate::events::{NoopEventHandler, QueuedEvent, SecAgreeEvent, SecAgreeEventHandler};
use crate::message::InboundMessage;
use crate::owner::SecAgreeOwner;
use crate::security_data::SecurityData;
use crate::types::{
    ChannelId, OwnerId, Reason, Role, SecAgreeHandle, SecAgreeState, SecAgreeStatus, TransportType,
};

/// Entry point of the security-agreement engine
pub struct SecAgreeManager {
    deps: Arc<AgreementDeps>,
    arena: AgreementArena,
    handler: RwLock<Arc<dyn SecAgreeEventHandler>>,
    event_tx: broadcast::Sender<SecAgreeEvent>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SecAgreeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecAgreeManager")
            .field("agreements", &self.arena.len())
            .field("pending_events", &self.deps.queue.len())
            .finish()
    }
}

impl SecAgreeManager {
    /// Create a manager; fails when the configuration is invalid
    pub fn new(config: SecAgreeConfig, factory: Arc<dyn SecureChannelFactory>) -> SecAgreeResult<Self> {
        config.validate().map_err(SecAgreeError::config)?;
        let (event_tx, _) = broadcast::channel(config.event_broadcast_capacity);
        info!(
            "security-agreement manager created (max agreements {}, ipsec {}, tls {})",
            config.max_agreements, config.ipsec_enabled, config.tls_enabled
        );
        Ok(Self {
            arena: AgreementArena::new(config.max_agreements),
            deps: Arc::new(AgreementDeps::new(config, factory)),
            handler: RwLock::new(Arc::new(NoopEventHandler)),
            event_tx,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SecAgreeConfig {
        &self.deps.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.deps.capabilities
    }

    pub fn set_event_handler(&self, handler: Arc<dyn SecAgreeEventHandler>) {
        *self.handler.write() = handler;
    }

    /// Receive every notification after the handler and owners have seen it
    pub fn subscribe(&self) -> broadcast::Receiver<SecAgreeEvent> {
        self.event_tx.subscribe()
    }

    /// Allocate a new agreement
    ///
    /// It starts with role and state Undefined and the configured default
    /// local endpoints.
    pub fn create_agreement(&self, app_handle: Option<u64>) -> SecAgreeResult<SecAgreeHandle> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SecAgreeError::illegal_action("manager is shut down"));
        }
        let agreement = self
            .arena
            .insert(|handle| SecAgreement::new(handle, self.deps.clone()))?;
        if let Some(app_handle) = app_handle {
            agreement.set_app_handle(app_handle)?;
        }
        debug!("security-agreement {} created", agreement.handle());
        Ok(agreement.handle())
    }

    pub fn agreement(&self, handle: SecAgreeHandle) -> SecAgreeResult<Arc<SecAgreement>> {
        self.arena
            .get(handle)
            .ok_or_else(|| SecAgreeError::not_found(format!("no security-agreement {}", handle)))
    }

    pub fn agreements_for_owner(&self, owner: OwnerId) -> Vec<SecAgreeHandle> {
        self.deps
            .owner_index
            .get(&owner)
            .map(|handles| handles.clone())
            .unwrap_or_default()
    }

    pub fn agreement_count(&self) -> usize {
        self.arena.len()
    }

    pub fn pending_events(&self) -> usize {
        self.deps.queue.len()
    }

    /// Terminate every live agreement and deliver the resulting events
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        for agreement in self.arena.all() {
            if let Err(e) = agreement.terminate() {
                warn!("security-agreement {} did not terminate: {}", agreement.handle(), e);
            }
        }
        self.dispatch_pending();
        self.deps.queue.wake();
        info!("security-agreement manager shut down");
    }

    // ---------------------------------------------------------------
    // Secure-channel reports
    // ---------------------------------------------------------------

    /// A secure channel changed state; handled by the dispatcher
    pub fn channel_state_changed(
        &self,
        handle: SecAgreeHandle,
        channel: ChannelId,
        state: ChannelState,
    ) -> SecAgreeResult<()> {
        self.deps
            .queue
            .push(QueuedEvent::ChannelStateChanged { handle, channel, state })
    }

    /// A secure channel raised a status; handled by the dispatcher
    pub fn channel_status(
        &self,
        handle: SecAgreeHandle,
        channel: ChannelId,
        status: ChannelStatus,
    ) -> SecAgreeResult<()> {
        self.deps.queue.push(QueuedEvent::ChannelStatus { handle, channel, status })
    }

    // ---------------------------------------------------------------
    // Message drivers spanning two agreements
    // ---------------------------------------------------------------

    /// Feed a received response to the client agreement of `owner`
    ///
    /// Returns the agreement the owner should keep using: `current`, a
    /// replacement obtained from
    /// [`SecAgreeOwner::on_negotiation_required`], or `None`.
    pub fn client_message_received(
        &self,
        owner: &Arc<dyn SecAgreeOwner>,
        current: Option<SecAgreeHandle>,
        msg: &InboundMessage,
    ) -> SecAgreeResult<Option<SecAgreeHandle>> {
        match current {
            Some(handle) => {
                let agreement = self.agreement(handle)?;
                if agreement.client_message_received(msg, false)? == ReceivedOutcome::Processed {
                    return Ok(Some(handle));
                }
            }
            None => {
                if !msg.can_be_part_of_negotiation() || msg.security_server.is_empty() {
                    return Ok(None);
                }
            }
        }
        self.find_replacement(owner, current, Role::Client, |agreement| {
            agreement.client_message_received(msg, true)
        })
    }

    /// Feed a received request to the server agreement of `owner`
    pub fn server_message_received(
        &self,
        owner: &Arc<dyn SecAgreeOwner>,
        current: Option<SecAgreeHandle>,
        msg: &InboundMessage,
    ) -> SecAgreeResult<Option<SecAgreeHandle>> {
        match current {
            Some(handle) => {
                let agreement = self.agreement(handle)?;
                if agreement.server_message_received(msg, false)? == ReceivedOutcome::Processed {
                    return Ok(Some(handle));
                }
            }
            None => {
                if !msg.is_negotiable_request()
                    || (msg.via_count > 1 && msg.require_sec_agree)
                    || (msg.transport == Some(TransportType::Tls) && !msg.require_sec_agree)
                {
                    return Ok(None);
                }
                if msg.security_client.is_empty() && msg.security_verify.is_empty() {
                    return Ok(None);
                }
            }
        }
        self.find_replacement(owner, current, Role::Server, |agreement| {
            agreement.server_message_received(msg, true)
        })
    }

    fn find_replacement(
        &self,
        owner: &Arc<dyn SecAgreeOwner>,
        current: Option<SecAgreeHandle>,
        role: Role,
        process: impl FnOnce(&SecAgreement) -> SecAgreeResult<ReceivedOutcome>,
    ) -> SecAgreeResult<Option<SecAgreeHandle>> {
        debug!("owner {} needs a new {} security-agreement", owner.id(), role);
        let Some(handle) = owner.on_negotiation_required(self, current, role) else {
            return Ok(None);
        };
        let agreement = self.agreement(handle)?;
        match process(&agreement)? {
            ReceivedOutcome::Processed => Ok(Some(handle)),
            ReceivedOutcome::ReplacementRequired => {
                agreement.invalidate(Reason::Undefined)?;
                Err(SecAgreeError::illegal_action(format!(
                    "replacement security-agreement {} cannot take the message",
                    handle
                )))
            }
        }
    }

    // ---------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------

    /// Deliver every queued notification; returns how many were handled
    ///
    /// A call made while another drain is running (including from inside a
    /// callback) returns 0 and leaves the entries to that drain.
    pub fn dispatch_pending(&self) -> usize {
        let Some(_drain) = self.deps.queue.try_begin_drain() else {
            return 0;
        };
        let mut handled = 0;
        while let Some(event) = self.deps.queue.pop() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Run [`dispatch_pending`](Self::dispatch_pending) whenever something
    /// is queued
    ///
    /// Each drain runs on the blocking pool, since it may wait on agreement
    /// locks and callbacks are free to block.
    pub fn spawn_dispatcher(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = self.deps.queue.clone();
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match manager.upgrade() {
                    Some(m) if !m.closed.load(Ordering::Acquire) => {
                        let drained = tokio::task::spawn_blocking(move || m.dispatch_pending()).await;
                        if let Err(e) = drained {
                            warn!("security-agreement drain failed: {}", e);
                            break;
                        }
                    }
                    _ => break,
                }
                queue.notified().await;
            }
            debug!("security-agreement dispatcher stopped");
        })
    }

    fn handler(&self) -> Arc<dyn SecAgreeEventHandler> {
        self.handler.read().clone()
    }

    fn publish(&self, event: SecAgreeEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn live_owners(&self, agreement: &SecAgreement) -> Option<(SecAgreeState, Vec<Arc<dyn SecAgreeOwner>>)> {
        agreement
            .with_event_any(|inner, _| {
                let owners = inner.owners.iter().filter_map(|r| r.upgrade()).collect();
                Ok((inner.state, owners))
            })
            .ok()
    }

    fn dispatch(&self, event: QueuedEvent) {
        let handle = event.handle();
        let Some(agreement) = self.arena.get(handle) else {
            debug!("dropping {:?} for a destructed agreement", event);
            return;
        };

        match event {
            QueuedEvent::StateChanged { state, reason, .. } => {
                let Some((current, owners)) = self.live_owners(&agreement) else {
                    return;
                };
                if current == SecAgreeState::Terminated {
                    debug!("security-agreement {} terminated, dropping state {}", handle, state);
                    return;
                }
                self.handler().on_state_changed(handle, state, reason);
                for owner in owners {
                    owner.on_state_changed(handle, state, reason);
                }
                self.publish(SecAgreeEvent::StateChanged { handle, state, reason, timestamp: Utc::now() });
            }
            QueuedEvent::Terminated { reason, .. } => self.destruct(&agreement, reason),
            QueuedEvent::Status { status, .. } => self.deliver_status(&agreement, status),
            QueuedEvent::SupplyChannel { .. } => {
                let supplied = agreement.with_event(|inner, _| {
                    let owners: Vec<_> = inner.owners.iter().filter_map(|r| r.upgrade()).collect();
                    Ok((inner.channel.clone(), owners))
                });
                let Ok((Some(channel), owners)) = supplied else {
                    return;
                };
                for owner in owners {
                    // an earlier owner may have invalidated the agreement
                    if !matches!(agreement.state(), Ok(state) if state.is_valid()) {
                        break;
                    }
                    owner.on_secure_channel_attached(handle, channel.clone());
                }
            }
            QueuedEvent::ChannelStateChanged { channel, state, .. } => {
                let result = agreement.with_event(|inner, deps| {
                    let own = inner.channel.as_ref().is_some_and(|c| c.id() == channel);
                    if own && state.is_going_down() && inner.state.is_valid() {
                        info!("security-agreement {}: secure channel {} is {}", handle, channel, state);
                        inner.invalidate(deps, Reason::SecurityObjExpired);
                    }
                    Ok(())
                });
                if let Err(e) = result {
                    debug!("channel state for {} ignored: {}", handle, e);
                }
            }
            QueuedEvent::ChannelStatus { channel, status, .. } => {
                let own = agreement
                    .with_event(|inner, _| Ok(inner.channel.as_ref().is_some_and(|c| c.id() == channel)))
                    .unwrap_or(false);
                if !own {
                    return;
                }
                match status {
                    ChannelStatus::IpsecLifetimeExpired => {
                        self.deliver_status(&agreement, SecAgreeStatus::IpsecLifetimeExpired)
                    }
                }
            }
        }
    }

    fn deliver_status(&self, agreement: &SecAgreement, status: SecAgreeStatus) {
        let handle = agreement.handle();
        let Some((state, owners)) = self.live_owners(agreement) else {
            return;
        };
        if state == SecAgreeState::Terminated {
            return;
        }
        self.handler().on_status(handle, status);
        for owner in owners {
            owner.on_status(handle, status);
        }
        self.publish(SecAgreeEvent::Status { handle, status, timestamp: Utc::now() });
    }

    fn destruct(&self, agreement: &SecAgreement, reason: Reason) {
        let handle = agreement.handle();
        self.handler().on_state_changed(handle, SecAgreeState::Terminated, reason);

        let released = agreement.with_event_any(|inner, _| {
            let owners = std::mem::take(&mut inner.owners);
            let channel = inner.channel.take();
            inner.data = SecurityData::new();
            agreement.invalidate_generation();
            Ok((owners, channel))
        });
        let (owners, channel) = match released {
            Ok(released) => released,
            Err(e) => {
                debug!("security-agreement {} already destructed: {}", handle, e);
                return;
            }
        };

        if let Some(channel) = channel {
            if !channel.state().is_going_down() {
                if let Err(e) = channel.terminate() {
                    warn!("secure channel {} did not terminate: {}", channel.id(), e);
                }
            }
        }
        for record in owners {
            agreement.deps().unindex_owner(record.id, handle);
            if let Some(owner) = record.upgrade() {
                owner.on_detached(handle);
            }
        }
        self.arena.remove(handle);
        info!("security-agreement {} destructed", handle);
        self.publish(SecAgreeEvent::Destructed { handle, reason, timestamp: Utc::now() });
    }
}
