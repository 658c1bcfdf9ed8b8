//! The security-agreement object
//!
//! A [`SecAgreement`] lives in the manager's arena and is shared through
//! `Arc`. Its mutable part, [`SecAgreeInner`], is only reached through
//! [`SecAgreement::with_api`] or [`SecAgreement::with_event`], which first
//! take the object's triple lock and verify the generation. Nothing in here
//! calls application or owner code; notifications go to the event queue and
//! are delivered by the manager's dispatcher.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::channel::coordinator::{self, ChannelMechanisms};
use crate::channel::{SecureChannel, SecureChannelFactory};
use crate::config::{Capabilities, SecAgreeConfig};
use crate::errors::{SecAgreeError, SecAgreeResult};
use crate::events::{EventQueue, QueuedEvent};
use crate::lock::{ObjectLock, TripleLock};
use crate::owner::{OwnerRecord, SecAgreeOwner};
use crate::security_data::{ListKind, SecurityData};
use crate::selection;
use crate::state::{
    consider_new_status, next_transition, status_notification, ProcessingEvent, StatusContext,
    StatusTrigger,
};
use crate::types::{
    AssociationStatus, ChannelId, IpsecInfo, MechanismType, NetworkEndpoints, OwnerId, Reason,
    Role, SecAgreeHandle, SecAgreeState, SecurityHeader, SpecialStandard, TransportType,
};

/// Owner id to the agreements it is attached to
pub(crate) type OwnerIndex = DashMap<OwnerId, Vec<SecAgreeHandle>>;

/// Collaborators shared by every agreement of one manager
pub(crate) struct AgreementDeps {
    pub(crate) config: SecAgreeConfig,
    pub(crate) capabilities: Capabilities,
    pub(crate) factory: Arc<dyn SecureChannelFactory>,
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) owner_index: OwnerIndex,
}

impl AgreementDeps {
    pub(crate) fn new(config: SecAgreeConfig, factory: Arc<dyn SecureChannelFactory>) -> Self {
        Self {
            capabilities: config.capabilities(),
            queue: Arc::new(EventQueue::new(config.state_event_capacity)),
            factory,
            owner_index: DashMap::new(),
            config,
        }
    }

    pub(crate) fn index_owner(&self, owner: OwnerId, handle: SecAgreeHandle) {
        self.owner_index.entry(owner).or_default().push(handle);
    }

    pub(crate) fn unindex_owner(&self, owner: OwnerId, handle: SecAgreeHandle) {
        let emptied = match self.owner_index.get_mut(&owner) {
            Some(mut handles) => {
                handles.retain(|h| *h != handle);
                handles.is_empty()
            }
            None => false,
        };
        if emptied {
            self.owner_index.remove_if(&owner, |_, handles| handles.is_empty());
        }
    }
}

/// Mutable state of an agreement
pub(crate) struct SecAgreeInner {
    pub(crate) handle: SecAgreeHandle,
    pub(crate) role: Role,
    pub(crate) state: SecAgreeState,
    pub(crate) data: SecurityData,
    pub(crate) owners: Vec<OwnerRecord>,
    pub(crate) endpoints: NetworkEndpoints,
    pub(crate) context: Option<String>,
    pub(crate) app_handle: Option<u64>,
    pub(crate) channel: Option<Arc<dyn SecureChannel>>,
    pub(crate) channel_mechanisms: ChannelMechanisms,
    pub(crate) association: AssociationStatus,
    pub(crate) response_code: Option<u16>,
    pub(crate) special_standard: SpecialStandard,
    pub(crate) terminate_reason: Reason,
}

impl SecAgreeInner {
    fn new(handle: SecAgreeHandle, config: &SecAgreeConfig) -> Self {
        Self {
            handle,
            role: Role::Undefined,
            state: SecAgreeState::Undefined,
            data: SecurityData::new(),
            owners: Vec::new(),
            endpoints: NetworkEndpoints {
                local_ipsec_ip: config.default_local_ipsec_ip,
                local_tls: config.default_local_tls_addr,
                ..Default::default()
            },
            context: None,
            app_handle: None,
            channel: None,
            channel_mechanisms: ChannelMechanisms::default(),
            association: AssociationStatus::Undefined,
            response_code: None,
            special_standard: SpecialStandard::Undefined,
            terminate_reason: Reason::Undefined,
        }
    }

    pub(crate) fn is_gm_interface(&self) -> bool {
        self.special_standard.is_gm_interface()
    }

    /// Move to `state` and queue the notification
    ///
    /// When the notification cannot be queued the agreement is terminated
    /// instead, since owners would otherwise never learn about the change.
    pub(crate) fn change_state(&mut self, deps: &AgreementDeps, state: SecAgreeState, reason: Reason) {
        if state == SecAgreeState::Terminated {
            self.terminate(deps, reason);
            return;
        }
        let old = self.state;
        if state.ends_negotiation() {
            self.end_negotiation();
        }
        self.state = state;
        info!(
            "security-agreement {} state changed from {} to {}, reason {}",
            self.handle, old, state, reason
        );

        let queued = deps.queue.push(QueuedEvent::StateChanged {
            handle: self.handle,
            state,
            reason,
        });
        if let Err(e) = queued {
            error!(
                "security-agreement {}: could not queue state {} ({}), terminating",
                self.handle, state, e
            );
            self.terminate(deps, Reason::OutOfResources);
        }
    }

    fn end_negotiation(&mut self) {
        self.response_code = None;
        self.data.reset_negotiation();
    }

    /// Run the transition table for `event`
    pub(crate) fn progress(&mut self, deps: &AgreementDeps, event: &ProcessingEvent) {
        let Some(transition) = next_transition(self.role, self.state, event) else {
            debug!(
                "security-agreement {}: no transition from {} on {}",
                self.handle, self.state, event
            );
            return;
        };
        if transition.clears_local_list {
            self.data.clear_local_list();
        }
        if transition.arms_client_list_by_ipsec {
            self.data.insert_client_list = crate::types::InsertClientList::ByIpsec;
        }
        if let Some(code) = transition.recommend {
            self.response_code = Some(code);
        }
        self.change_state(deps, transition.to, transition.reason);
    }

    /// Force the agreement to Invalid
    pub(crate) fn invalidate(&mut self, deps: &AgreementDeps, reason: Reason) {
        if self.state == SecAgreeState::Terminated {
            return;
        }
        self.association = AssociationStatus::Undefined;
        self.change_state(deps, SecAgreeState::Invalid, reason);
    }

    /// Mark the agreement Terminated and queue its destruction
    pub(crate) fn terminate(&mut self, deps: &AgreementDeps, reason: Reason) {
        if self.state == SecAgreeState::Terminated {
            return;
        }
        let old = self.state;
        self.end_negotiation();
        self.state = SecAgreeState::Terminated;
        self.terminate_reason = reason;
        info!(
            "security-agreement {} state changed from {} to {}, reason {}",
            self.handle, old, self.state, reason
        );
        if let Err(e) = deps.queue.push(QueuedEvent::Terminated { handle: self.handle, reason }) {
            error!("security-agreement {}: termination not queued: {}", self.handle, e);
        }
    }

    pub(crate) fn status_context(&self) -> StatusContext {
        StatusContext {
            role: self.role,
            state: self.state,
            gm_interface: self.is_gm_interface(),
            selected: self.data.selected_mechanism(),
        }
    }

    /// Apply an association-status trigger and queue the notification
    pub(crate) fn update_status(&mut self, deps: &AgreementDeps, trigger: StatusTrigger) -> SecAgreeResult<()> {
        let Some(status) = consider_new_status(self.association, trigger, &self.status_context())? else {
            return Ok(());
        };
        debug!(
            "security-agreement {} association status {:?} -> {:?}",
            self.handle, self.association, status
        );
        self.association = status;
        if let Some(notification) = status_notification(status) {
            let queued = deps.queue.push(QueuedEvent::Status {
                handle: self.handle,
                status: notification,
            });
            if let Err(e) = queued {
                warn!("security-agreement {}: status {} dropped: {}", self.handle, notification, e);
            }
        }
        Ok(())
    }

    /// Same as [`update_status`](Self::update_status) for callers that cannot fail
    pub(crate) fn consider_status(&mut self, deps: &AgreementDeps, trigger: StatusTrigger) {
        if let Err(e) = self.update_status(deps, trigger) {
            warn!("security-agreement {}: association status not updated: {}", self.handle, e);
        }
    }

    pub(crate) fn owner_position(&self, owner: OwnerId) -> Option<usize> {
        self.owners.iter().position(|r| r.id == owner)
    }
}

/// A security-agreement shared by one or more owners
pub struct SecAgreement {
    handle: SecAgreeHandle,
    lock: ObjectLock,
    inner: Mutex<SecAgreeInner>,
    deps: Arc<AgreementDeps>,
}

impl fmt::Debug for SecAgreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecAgreement")
            .field("handle", &self.handle)
            .field("generation", &self.lock.generation())
            .finish()
    }
}

impl SecAgreement {
    pub(crate) fn new(handle: SecAgreeHandle, deps: Arc<AgreementDeps>) -> Self {
        Self {
            handle,
            lock: ObjectLock::new(handle.generation),
            inner: Mutex::new(SecAgreeInner::new(handle, &deps.config)),
            deps,
        }
    }

    pub fn handle(&self) -> SecAgreeHandle {
        self.handle
    }

    /// Whether the agreement has not been destructed
    pub fn is_live(&self) -> bool {
        self.lock.is_live(self.handle.generation)
    }

    /// Move the agreement onto a lock set shared with its owner
    pub fn share_lock_set(&self, lock_set: Arc<TripleLock>) {
        self.lock.rehome(lock_set);
    }

    pub fn lock_set(&self) -> Arc<TripleLock> {
        self.lock.lock_set()
    }

    fn destructed(&self) -> SecAgreeError {
        SecAgreeError::destructed(self.handle)
    }

    fn enter<R>(
        &self,
        allow_terminated: bool,
        f: impl FnOnce(&mut SecAgreeInner, &AgreementDeps) -> SecAgreeResult<R>,
    ) -> SecAgreeResult<R> {
        let Some(mut inner) = self.inner.try_lock() else {
            return Err(SecAgreeError::illegal_action(format!(
                "{} is already being modified by this thread",
                self.handle
            )));
        };
        if !allow_terminated && inner.state == SecAgreeState::Terminated {
            return Err(self.destructed());
        }
        f(&mut inner, &self.deps)
    }

    /// Run `f` on the API path
    pub(crate) fn with_api<R>(
        &self,
        f: impl FnOnce(&mut SecAgreeInner, &AgreementDeps) -> SecAgreeResult<R>,
    ) -> SecAgreeResult<R> {
        let _guard = self
            .lock
            .lock_api(self.handle.generation)
            .map_err(|_| self.destructed())?;
        self.enter(false, f)
    }

    /// Run `f` on the event path
    pub(crate) fn with_event<R>(
        &self,
        f: impl FnOnce(&mut SecAgreeInner, &AgreementDeps) -> SecAgreeResult<R>,
    ) -> SecAgreeResult<R> {
        let _guard = self
            .lock
            .lock_event(self.handle.generation)
            .map_err(|_| self.destructed())?;
        self.enter(false, f)
    }

    /// Event path that still reaches a Terminated agreement
    pub(crate) fn with_event_any<R>(
        &self,
        f: impl FnOnce(&mut SecAgreeInner, &AgreementDeps) -> SecAgreeResult<R>,
    ) -> SecAgreeResult<R> {
        let _guard = self
            .lock
            .lock_event(self.handle.generation)
            .map_err(|_| self.destructed())?;
        self.enter(true, f)
    }

    /// Reset the generation; every later lock attempt fails
    pub(crate) fn invalidate_generation(&self) {
        self.lock.invalidate();
    }

    pub(crate) fn deps(&self) -> &AgreementDeps {
        &self.deps
    }

    // ---------------------------------------------------------------
    // Identity
    // ---------------------------------------------------------------

    pub fn role(&self) -> SecAgreeResult<Role> {
        self.with_api(|inner, _| Ok(inner.role))
    }

    /// Set the role once; the agreement becomes Idle
    pub fn set_role(&self, role: Role) -> SecAgreeResult<()> {
        if role == Role::Undefined {
            return Err(SecAgreeError::invalid_argument("role must be client or server"));
        }
        self.with_api(|inner, _| {
            if inner.role != Role::Undefined {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} already has role {}",
                    inner.handle, inner.role
                )));
            }
            inner.role = role;
            inner.state = SecAgreeState::Idle;
            debug!("security-agreement {} is now a {} in state Idle", inner.handle, role);
            Ok(())
        })
    }

    pub fn state(&self) -> SecAgreeResult<SecAgreeState> {
        self.with_api(|inner, _| Ok(inner.state))
    }

    pub fn app_handle(&self) -> SecAgreeResult<Option<u64>> {
        self.with_api(|inner, _| Ok(inner.app_handle))
    }

    pub fn set_app_handle(&self, app_handle: u64) -> SecAgreeResult<()> {
        self.with_api(|inner, _| {
            inner.app_handle = Some(app_handle);
            Ok(())
        })
    }

    pub fn context(&self) -> SecAgreeResult<Option<String>> {
        self.with_api(|inner, _| Ok(inner.context.clone()))
    }

    /// Correlation data handed to the secure channel on construction
    pub fn set_context(&self, context: impl Into<String>) -> SecAgreeResult<()> {
        let context = context.into();
        self.with_api(|inner, _| {
            inner.context = Some(context);
            Ok(())
        })
    }

    pub fn special_standard(&self) -> SecAgreeResult<SpecialStandard> {
        self.with_api(|inner, _| Ok(inner.special_standard))
    }

    pub fn set_special_standard(&self, standard: SpecialStandard) -> SecAgreeResult<()> {
        self.with_api(|inner, _| {
            inner.special_standard = standard;
            Ok(())
        })
    }

    pub fn association_status(&self) -> SecAgreeResult<AssociationStatus> {
        self.with_api(|inner, _| Ok(inner.association))
    }

    pub fn recommended_response_code(&self) -> SecAgreeResult<Option<u16>> {
        self.with_api(|inner, _| Ok(inner.response_code))
    }

    /// Terminate the agreement; calling it again is a no-op
    pub fn terminate(&self) -> SecAgreeResult<()> {
        let _guard = match self.lock.lock_api(self.handle.generation) {
            Ok(guard) => guard,
            Err(_) => return Ok(()),
        };
        self.enter(true, |inner, deps| {
            inner.terminate(deps, Reason::Undefined);
            Ok(())
        })
    }

    /// Force the agreement to Invalid
    pub fn invalidate(&self, reason: Reason) -> SecAgreeResult<()> {
        self.with_api(|inner, deps| {
            inner.invalidate(deps, reason);
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Local list
    // ---------------------------------------------------------------

    pub fn push_local_header(&self, header: SecurityHeader) -> SecAgreeResult<()> {
        self.with_api(|inner, _| {
            if !inner.state.can_modify_local_list() {
                return Err(SecAgreeError::illegal_action(format!(
                    "local list of {} cannot change in state {}",
                    inner.handle, inner.state
                )));
            }
            inner.data.push_header(ListKind::Local, header)
        })
    }

    pub fn remove_local_header(&self, mechanism: MechanismType) -> SecAgreeResult<SecurityHeader> {
        self.with_api(|inner, _| {
            if !inner.state.can_modify_local_list() {
                return Err(SecAgreeError::illegal_action(format!(
                    "local list of {} cannot change in state {}",
                    inner.handle, inner.state
                )));
            }
            inner.data.remove_local_header(mechanism)
        })
    }

    pub fn local_list(&self) -> SecAgreeResult<Vec<SecurityHeader>> {
        self.with_api(|inner, _| Ok(inner.data.local_list().to_vec()))
    }

    pub fn remote_list(&self) -> SecAgreeResult<Vec<SecurityHeader>> {
        self.with_api(|inner, _| Ok(inner.data.remote_list().to_vec()))
    }

    /// Complete the local list and start the negotiation
    pub fn init(&self) -> SecAgreeResult<()> {
        self.with_api(|inner, deps| {
            if !inner.state.can_modify_local_list() {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} cannot be initialized in state {}",
                    inner.handle, inner.state
                )));
            }
            if inner.data.local_list().is_empty() {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} has an empty local security list",
                    inner.handle
                )));
            }
            if !selection::is_list_legal(inner.data.local_list()) {
                return Err(SecAgreeError::illegal_action(
                    "ipsec-3gpp header needs alg, ealg, prot=esp and mod=trans",
                ));
            }
            coordinator::update_channel(inner, deps, &ProcessingEvent::Init)?;
            inner.progress(deps, &ProcessingEvent::Init);
            Ok(())
        })
    }

    /// Take over the local part of a previous agreement
    ///
    /// Used on renegotiation: the destination is a fresh agreement and
    /// `source` the one being replaced.
    pub fn copy_from(&self, source: &SecAgreement) -> SecAgreeResult<()> {
        if std::ptr::eq(self, source) {
            return Err(SecAgreeError::invalid_argument("cannot copy an agreement onto itself"));
        }
        self.with_api(|dest, _| {
            if dest.role != Role::Undefined && !dest.state.can_modify_local_list() {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} cannot take a copy in state {}",
                    dest.handle, dest.state
                )));
            }
            let src = source.snapshot_for_copy()?;

            let role = if dest.role == Role::Undefined { src.role } else { dest.role };
            dest.data.copy_from(&src.data, role, src.special_standard.is_gm_interface(), src.keep_port_s)?;

            if dest.role == Role::Undefined && src.role != Role::Undefined {
                dest.role = src.role;
                dest.state = SecAgreeState::Idle;
            }
            dest.endpoints = src.endpoints;
            dest.special_standard = src.special_standard;
            dest.context = src.context;
            dest.data.cseq_step = src.data.cseq_step();
            debug!("security-agreement {} copied from {}", dest.handle, source.handle);
            Ok(())
        })
    }

    fn snapshot_for_copy(&self) -> SecAgreeResult<CopySource> {
        let _guard = self
            .lock
            .lock_api(self.handle.generation)
            .map_err(|_| self.destructed())?;
        // the source may already be Invalid or Terminated
        self.enter(true, |inner, _| {
            Ok(CopySource {
                role: inner.role,
                data: inner.data.clone(),
                endpoints: inner.endpoints.clone(),
                special_standard: inner.special_standard,
                context: inner.context.clone(),
                keep_port_s: inner.channel.is_some() && inner.channel_mechanisms.ipsec,
            })
        })
    }

    // ---------------------------------------------------------------
    // Auxiliary data
    // ---------------------------------------------------------------

    pub fn endpoints(&self) -> SecAgreeResult<NetworkEndpoints> {
        self.with_api(|inner, _| Ok(inner.endpoints.clone()))
    }

    pub fn set_local_endpoints(&self, ipsec_ip: Option<IpAddr>, tls: Option<SocketAddr>) -> SecAgreeResult<()> {
        self.with_api(|inner, _| {
            inner.endpoints.local_ipsec_ip = ipsec_ip;
            inner.endpoints.local_tls = tls;
            Ok(())
        })
    }

    pub fn set_remote_endpoints(
        &self,
        ipsec: Option<(SocketAddr, TransportType)>,
        tls: Option<SocketAddr>,
    ) -> SecAgreeResult<()> {
        if matches!(ipsec, Some((_, TransportType::Tls))) {
            return Err(SecAgreeError::invalid_argument("ipsec-3gpp runs over UDP or TCP"));
        }
        self.with_api(|inner, _| {
            inner.endpoints.remote_ipsec = ipsec.map(|(addr, _)| addr);
            inner.endpoints.remote_ipsec_transport = ipsec.map(|(_, transport)| transport);
            inner.endpoints.remote_tls = tls;
            Ok(())
        })
    }

    pub fn ipsec_info(&self) -> SecAgreeResult<Option<IpsecInfo>> {
        self.with_api(|inner, _| Ok(inner.data.ipsec_info().cloned()))
    }

    /// Keys and lifetime for ipsec-3gpp, before the channel is activated
    pub fn set_ipsec_info(&self, info: IpsecInfo) -> SecAgreeResult<()> {
        info.validate()?;
        self.with_api(|inner, _| {
            let activated = matches!(
                inner.state,
                SecAgreeState::Active | SecAgreeState::NoAgreementRequired
            );
            if !inner.state.is_valid() || activated {
                return Err(SecAgreeError::illegal_action(format!(
                    "IPsec keys of {} cannot change in state {}",
                    inner.handle, inner.state
                )));
            }
            inner.data.ipsec_info = Some(info);
            Ok(())
        })
    }

    pub fn start_ipsec_lifetime_timer(&self, interval: Duration) -> SecAgreeResult<()> {
        if interval.is_zero() {
            return Err(SecAgreeError::invalid_argument("lifetime interval must be positive"));
        }
        self.with_api(|inner, _| {
            if !inner.state.is_valid() {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} is {}",
                    inner.handle, inner.state
                )));
            }
            let channel = inner
                .channel
                .as_ref()
                .ok_or_else(|| SecAgreeError::illegal_action("no secure channel"))?;
            channel.start_lifetime_timer(interval)?;
            Ok(())
        })
    }

    pub fn remaining_ipsec_lifetime(&self) -> SecAgreeResult<Option<Duration>> {
        self.with_api(|inner, _| {
            if inner.state != SecAgreeState::Active {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} is not active",
                    inner.handle
                )));
            }
            let channel = inner
                .channel
                .as_ref()
                .ok_or_else(|| SecAgreeError::illegal_action("no secure channel"))?;
            Ok(channel.remaining_lifetime()?)
        })
    }

    /// The secure channel this agreement drives, if any
    pub fn secure_channel(&self) -> SecAgreeResult<Option<Arc<dyn SecureChannel>>> {
        self.with_api(|inner, _| Ok(inner.channel.clone()))
    }

    /// Whether a transport should let go of `channel`
    ///
    /// True while the agreement is not Active and `channel` is its own.
    pub fn should_detach_channel(&self, channel: ChannelId) -> SecAgreeResult<bool> {
        self.with_api(|inner, _| {
            let own = inner.channel.as_ref().is_some_and(|c| c.id() == channel);
            Ok(own && inner.state != SecAgreeState::Active)
        })
    }

    // ---------------------------------------------------------------
    // Owners
    // ---------------------------------------------------------------

    /// Attach an owner
    ///
    /// Returns the secure channel when the agreement and its channel are
    /// both active, so the owner can start using it right away.
    pub fn attach_owner(&self, owner: &Arc<dyn SecAgreeOwner>) -> SecAgreeResult<Option<Arc<dyn SecureChannel>>> {
        let record = OwnerRecord::new(owner);
        self.with_api(|inner, deps| {
            let allowed = inner.state.is_valid()
                && inner.state.can_attach_owner()
                && (inner.owners.is_empty() || inner.state.can_attach_several_owners());
            if !allowed {
                return Err(SecAgreeError::illegal_action(format!(
                    "{} cannot take owner {} in state {}",
                    inner.handle, record.id, inner.state
                )));
            }
            if inner.owner_position(record.id).is_some() {
                return Err(SecAgreeError::illegal_action(format!(
                    "owner {} is already attached to {}",
                    record.id, inner.handle
                )));
            }
            if inner.owners.len() >= deps.config.max_owners_per_agreement {
                return Err(SecAgreeError::out_of_resources(format!(
                    "{} already has {} owners",
                    inner.handle,
                    inner.owners.len()
                )));
            }

            debug!("security-agreement {}: attached {} {}", inner.handle, record.kind, record.id);
            deps.index_owner(record.id, inner.handle);
            inner.owners.push(record);

            let channel = match (&inner.channel, inner.state) {
                (Some(channel), SecAgreeState::Active)
                    if channel.state() == crate::channel::ChannelState::Active =>
                {
                    Some(channel.clone())
                }
                _ => None,
            };
            Ok(channel)
        })
    }

    /// Detach an owner; unknown owners are ignored
    pub fn detach_owner(&self, owner: OwnerId) -> SecAgreeResult<()> {
        self.with_api(|inner, deps| {
            if let Some(position) = inner.owner_position(owner) {
                let record = inner.owners.remove(position);
                deps.unindex_owner(record.id, inner.handle);
                debug!("security-agreement {}: detached {}", inner.handle, record.id);
            }
            Ok(())
        })
    }

    pub fn owner_count(&self) -> SecAgreeResult<usize> {
        self.with_api(|inner, _| Ok(inner.owners.len()))
    }

    pub fn owners(&self) -> SecAgreeResult<Vec<OwnerId>> {
        self.with_api(|inner, _| Ok(inner.owners.iter().map(|r| r.id).collect()))
    }
}

struct CopySource {
    role: Role,
    data: SecurityData,
    endpoints: NetworkEndpoints,
    special_standard: SpecialStandard,
    context: Option<String>,
    keep_port_s: bool,
}
