//! Locking tests
//!
//! API and event paths on one agreement never overlap, agreements sharing a
//! lock set can call into each other from one thread, and callbacks may
//! re-enter the engine.

mod common;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use common::*;
use rvoip_sec_agree_core::lock::{ObjectLock, TripleLock};
use rvoip_sec_agree_core::prelude::*;

/// Two API threads and two event threads take turns on one object
#[test]
fn test_api_and_event_paths_are_exclusive() {
    let lock = Arc::new(ObjectLock::new(9));
    let inside = Arc::new(AtomicBool::new(false));
    let entries = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let lock = lock.clone();
            let inside = inside.clone();
            let entries = entries.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    if n % 2 == 0 {
                        let _guard = lock.lock_api(9).unwrap();
                        assert!(!inside.swap(true, Ordering::SeqCst), "overlapping API entry");
                        thread::yield_now();
                        inside.store(false, Ordering::SeqCst);
                    } else {
                        let guard = lock.lock_event(9).unwrap();
                        assert!(!guard.is_reentrant());
                        assert!(!inside.swap(true, Ordering::SeqCst), "overlapping event entry");
                        thread::yield_now();
                        inside.store(false, Ordering::SeqCst);
                    }
                    entries.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(entries.load(Ordering::SeqCst), 800);
}

/// Agreements on one lock set can be copied from the same thread
#[test]
fn test_shared_lock_set_allows_nested_calls() -> Result<(), SecAgreeError> {
    let harness = Harness::new(SecAgreeConfig::default().with_ipsec_negotiation_only());
    let (_, previous) = harness.agreement(Role::Client);
    previous.push_local_header(SecurityHeader::digest())?;

    let handle = harness.manager.create_agreement(None)?;
    let fresh = harness.manager.agreement(handle)?;
    let shared = Arc::new(TripleLock::new());
    previous.share_lock_set(shared.clone());
    fresh.share_lock_set(shared.clone());
    assert!(Arc::ptr_eq(&previous.lock_set(), &fresh.lock_set()));

    fresh.copy_from(&previous)?;
    assert_eq!(fresh.local_list()?, vec![SecurityHeader::digest()]);
    assert_eq!(shared.object_depth(), 0);

    Ok(())
}

/// Concurrent application threads on separate agreements of one manager
#[test]
fn test_parallel_agreements() {
    let harness = Harness::new(SecAgreeConfig::default().with_ipsec_negotiation_only().without_tls());
    let manager = harness.manager.clone();

    let workers: Vec<_> = (0..8)
        .map(|n| {
            let manager = manager.clone();
            thread::spawn(move || -> Result<SecAgreeHandle, SecAgreeError> {
                let handle = manager.create_agreement(Some(n))?;
                let agreement = manager.agreement(handle)?;
                agreement.set_role(Role::Client)?;
                agreement.push_local_header(SecurityHeader::digest())?;
                agreement.init()?;
                let mut register = OutboundMessage::request("REGISTER", 1);
                agreement.client_message_to_send(&mut register)?;
                manager.dispatch_pending();
                Ok(handle)
            })
        })
        .collect();

    let handles: Vec<_> = workers
        .into_iter()
        .map(|w| w.join().unwrap().unwrap())
        .collect();
    manager.dispatch_pending();

    assert_eq!(manager.agreement_count(), 8);
    assert_eq!(manager.pending_events(), 0);
    for handle in handles {
        let states = harness.handler.states_of(handle);
        assert_eq!(
            states.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            vec![SecAgreeState::ClientLocalListReady, SecAgreeState::ClientHandlingInitialMsg]
        );
    }
}

/// Handler calling back into the manager during dispatch
#[derive(Default)]
struct ReentrantHandler {
    manager: Mutex<Weak<SecAgreeManager>>,
    observed: Mutex<Vec<Result<SecAgreeState, SecAgreeError>>>,
    nested_dispatches: AtomicUsize,
}

impl SecAgreeEventHandler for ReentrantHandler {
    fn on_state_changed(&self, agreement: SecAgreeHandle, _state: SecAgreeState, _reason: Reason) {
        let Some(manager) = self.manager.lock().upgrade() else {
            return;
        };
        self.nested_dispatches
            .fetch_add(manager.dispatch_pending(), Ordering::SeqCst);
        if let Ok(agreement) = manager.agreement(agreement) {
            self.observed.lock().push(agreement.state());
            if matches!(agreement.state(), Ok(SecAgreeState::ClientLocalListReady)) {
                let mut register = OutboundMessage::request("REGISTER", 1);
                let _ = agreement.client_message_to_send(&mut register);
            }
        }
    }
}

/// Callbacks run without locks held and may drive the agreement further
#[test]
fn test_handler_may_reenter() -> Result<(), SecAgreeError> {
    let manager = Arc::new(SecAgreeManager::new(
        SecAgreeConfig::default().with_ipsec_negotiation_only().without_tls(),
        Arc::new(NoChannelFactory),
    )?);
    let handler = Arc::new(ReentrantHandler::default());
    *handler.manager.lock() = Arc::downgrade(&manager);
    manager.set_event_handler(handler.clone());

    let handle = manager.create_agreement(None)?;
    let agreement = manager.agreement(handle)?;
    agreement.set_role(Role::Client)?;
    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;

    // the change made from inside the callback is delivered by the same drain
    assert_eq!(manager.dispatch_pending(), 2);
    assert_eq!(handler.nested_dispatches.load(Ordering::SeqCst), 0);
    assert_eq!(
        *handler.observed.lock(),
        vec![
            Ok(SecAgreeState::ClientLocalListReady),
            Ok(SecAgreeState::ClientHandlingInitialMsg),
        ]
    );
    assert_eq!(agreement.state()?, SecAgreeState::ClientHandlingInitialMsg);

    Ok(())
}
