//! Shared fixtures for the security-agreement integration tests
//!
//! Not every test file uses every helper.
#![allow(dead_code)]

use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rvoip_sec_agree_core::channel::{
    AssociationParams, ChannelState, IpsecLocalParams, IpsecPeerParams, IpsecRemoteParams,
    SecureChannel, SecureChannelFactory, TlsParams,
};
use rvoip_sec_agree_core::errors::{ChannelError, ChannelResult};
use rvoip_sec_agree_core::prelude::*;
use rvoip_sec_agree_core::types::ChannelId;

pub const CLIENT_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
pub const SERVER_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

pub fn client_addr() -> SocketAddr {
    SocketAddr::new(CLIENT_IP, 5060)
}

pub fn server_addr() -> SocketAddr {
    SocketAddr::new(SERVER_IP, 5060)
}

/// Secure channel that records what the engine asked of it
#[derive(Debug)]
pub struct MockChannel {
    id: ChannelId,
    state: Mutex<ChannelState>,
    fail_activate: bool,
    pub calls: Mutex<Vec<&'static str>>,
    pub remote_ipsec: Mutex<Option<IpsecRemoteParams>>,
    pub mechanism: Mutex<Option<MechanismType>>,
    lifetime: Mutex<Option<Duration>>,
}

impl MockChannel {
    fn new(id: u64, fail_activate: bool) -> Self {
        Self {
            id: ChannelId(id),
            state: Mutex::new(ChannelState::Idle),
            fail_activate,
            calls: Mutex::new(Vec::new()),
            remote_ipsec: Mutex::new(None),
            mechanism: Mutex::new(None),
            lifetime: Mutex::new(None),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().iter().any(|c| *c == call)
    }

    /// SPIs and ports handed out by this channel
    pub fn allocated(&self) -> IpsecPeerParams {
        let base = self.id.0 as u32 * 100;
        IpsecPeerParams {
            spi_c: Some(base + 1),
            spi_s: Some(base + 2),
            port_c: Some(6000 + base as u16),
            port_s: Some(6001 + base as u16),
        }
    }
}

impl SecureChannel for MockChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    fn set_context(&self, _context: &str) -> ChannelResult<()> {
        self.record("set_context");
        Ok(())
    }

    fn set_local_ipsec_params(&self, _params: &IpsecLocalParams) -> ChannelResult<()> {
        self.record("set_local_ipsec_params");
        Ok(())
    }

    fn initiate(&self) -> ChannelResult<()> {
        self.record("initiate");
        *self.state.lock() = ChannelState::Initiated;
        Ok(())
    }

    fn local_ipsec_params(&self) -> ChannelResult<IpsecPeerParams> {
        Ok(self.allocated())
    }

    fn set_remote_ipsec_params(&self, params: &IpsecRemoteParams) -> ChannelResult<()> {
        self.record("set_remote_ipsec_params");
        *self.remote_ipsec.lock() = Some(params.clone());
        Ok(())
    }

    fn set_tls_params(&self, _params: &TlsParams) -> ChannelResult<()> {
        self.record("set_tls_params");
        Ok(())
    }

    fn set_mechanism(&self, mechanism: MechanismType) -> ChannelResult<()> {
        self.record("set_mechanism");
        *self.mechanism.lock() = Some(mechanism);
        Ok(())
    }

    fn activate(&self) -> ChannelResult<()> {
        self.record("activate");
        if self.fail_activate {
            return Err(ChannelError::resource("no SAs left"));
        }
        *self.state.lock() = ChannelState::Active;
        Ok(())
    }

    fn terminate(&self) -> ChannelResult<()> {
        self.record("terminate");
        *self.state.lock() = ChannelState::Terminated;
        Ok(())
    }

    fn association_params(&self) -> ChannelResult<AssociationParams> {
        Ok(AssociationParams {
            mechanism: *self.mechanism.lock(),
            local: self.allocated(),
            ..Default::default()
        })
    }

    fn start_lifetime_timer(&self, interval: Duration) -> ChannelResult<()> {
        if self.state().is_going_down() {
            return Err(ChannelError::Closed);
        }
        *self.lifetime.lock() = Some(interval);
        Ok(())
    }

    fn remaining_lifetime(&self) -> ChannelResult<Option<Duration>> {
        Ok(*self.lifetime.lock())
    }
}

/// Factory keeping every channel it built
#[derive(Debug, Default)]
pub struct MockFactory {
    next_id: AtomicU64,
    pub fail_activate: AtomicBool,
    pub channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockFactory {
    pub fn last(&self) -> Option<Arc<MockChannel>> {
        self.channels.lock().last().cloned()
    }

    pub fn built(&self) -> usize {
        self.channels.lock().len()
    }
}

impl SecureChannelFactory for MockFactory {
    fn construct(&self, _agreement: SecAgreeHandle) -> ChannelResult<Arc<dyn SecureChannel>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let channel = Arc::new(MockChannel::new(id, self.fail_activate.load(Ordering::SeqCst)));
        self.channels.lock().push(channel.clone());
        Ok(channel)
    }
}

/// What an owner was told
#[derive(Debug, Clone, PartialEq)]
pub enum OwnerNote {
    State(SecAgreeState, Reason),
    Status(SecAgreeStatus),
    ChannelAttached(ChannelId),
    Detached,
}

type Replacement =
    Box<dyn Fn(&SecAgreeManager, Option<SecAgreeHandle>, Role) -> Option<SecAgreeHandle> + Send + Sync>;

/// Owner recording its callbacks
pub struct TestOwner {
    id: OwnerId,
    kind: OwnerKind,
    pub notes: Mutex<Vec<OwnerNote>>,
    replacement: Mutex<Option<Replacement>>,
}

impl TestOwner {
    pub fn new(kind: OwnerKind) -> Arc<Self> {
        Arc::new(Self {
            id: OwnerId::new(),
            kind,
            notes: Mutex::new(Vec::new()),
            replacement: Mutex::new(None),
        })
    }

    /// Answer `on_negotiation_required` with `replace`
    pub fn replace_with(
        &self,
        replace: impl Fn(&SecAgreeManager, Option<SecAgreeHandle>, Role) -> Option<SecAgreeHandle>
        + Send
        + Sync
        + 'static,
    ) {
        *self.replacement.lock() = Some(Box::new(replace));
    }

    pub fn notes(&self) -> Vec<OwnerNote> {
        self.notes.lock().clone()
    }

    pub fn count(&self, note: &OwnerNote) -> usize {
        self.notes.lock().iter().filter(|n| *n == note).count()
    }
}

impl SecAgreeOwner for TestOwner {
    fn id(&self) -> OwnerId {
        self.id
    }

    fn kind(&self) -> OwnerKind {
        self.kind
    }

    fn on_state_changed(&self, _agreement: SecAgreeHandle, state: SecAgreeState, reason: Reason) {
        self.notes.lock().push(OwnerNote::State(state, reason));
    }

    fn on_status(&self, _agreement: SecAgreeHandle, status: SecAgreeStatus) {
        self.notes.lock().push(OwnerNote::Status(status));
    }

    fn on_secure_channel_attached(&self, _agreement: SecAgreeHandle, channel: Arc<dyn SecureChannel>) {
        self.notes.lock().push(OwnerNote::ChannelAttached(channel.id()));
    }

    fn on_detached(&self, _agreement: SecAgreeHandle) {
        self.notes.lock().push(OwnerNote::Detached);
    }

    fn on_negotiation_required(
        &self,
        manager: &SecAgreeManager,
        current: Option<SecAgreeHandle>,
        role: Role,
    ) -> Option<SecAgreeHandle> {
        self.replacement
            .lock()
            .as_ref()
            .and_then(|replace| replace(manager, current, role))
    }
}

pub fn as_owner(owner: &Arc<TestOwner>) -> Arc<dyn SecAgreeOwner> {
    owner.clone()
}

/// Application handler recording state changes and statuses
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub states: Mutex<Vec<(SecAgreeHandle, SecAgreeState, Reason)>>,
    pub statuses: Mutex<Vec<(SecAgreeHandle, SecAgreeStatus)>>,
}

impl RecordingHandler {
    pub fn states_of(&self, handle: SecAgreeHandle) -> Vec<(SecAgreeState, Reason)> {
        self.states
            .lock()
            .iter()
            .filter(|(h, _, _)| *h == handle)
            .map(|(_, s, r)| (*s, *r))
            .collect()
    }

    pub fn statuses_of(&self, handle: SecAgreeHandle) -> Vec<SecAgreeStatus> {
        self.statuses
            .lock()
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, s)| *s)
            .collect()
    }
}

impl SecAgreeEventHandler for RecordingHandler {
    fn on_state_changed(&self, agreement: SecAgreeHandle, state: SecAgreeState, reason: Reason) {
        self.states.lock().push((agreement, state, reason));
    }

    fn on_status(&self, agreement: SecAgreeHandle, status: SecAgreeStatus) {
        self.statuses.lock().push((agreement, status));
    }
}

pub struct Harness {
    pub manager: Arc<SecAgreeManager>,
    pub factory: Arc<MockFactory>,
    pub handler: Arc<RecordingHandler>,
}

impl Harness {
    pub fn new(config: SecAgreeConfig) -> Self {
        let factory = Arc::new(MockFactory::default());
        let manager = Arc::new(
            SecAgreeManager::new(config, factory.clone()).expect("valid test configuration"),
        );
        let handler = Arc::new(RecordingHandler::default());
        manager.set_event_handler(handler.clone());
        Self { manager, factory, handler }
    }

    /// Create an agreement of `role` and return it with its handle
    pub fn agreement(&self, role: Role) -> (SecAgreeHandle, Arc<SecAgreement>) {
        let handle = self.manager.create_agreement(None).expect("free slot");
        let agreement = self.manager.agreement(handle).expect("live agreement");
        agreement.set_role(role).expect("role can be set in Idle");
        (handle, agreement)
    }
}

/// Client offer: HMAC-SHA-1-96 with AES-CBC
pub fn client_ipsec() -> SecurityHeader {
    SecurityHeader::ipsec_3gpp(IpsecAlgorithm::HmacSha1_96, EncryptAlgorithm::AesCbc)
}

/// What a server announces for ipsec-3gpp, with its own SPIs and ports
pub fn server_ipsec(q: QValue) -> SecurityHeader {
    SecurityHeader::ipsec_3gpp(IpsecAlgorithm::HmacSha1_96, EncryptAlgorithm::AesCbc)
        .with_preference(q)
        .with_spis(9001, 9002)
        .with_ports(7000, 7001)
}

pub fn challenge() -> AuthChallenge {
    AuthChallenge::new("ims.example.net", "bm9uY2U=")
}

pub fn ipsec_keys() -> IpsecInfo {
    IpsecInfo::new(vec![0x11; 16], vec![0x22; 16])
}
