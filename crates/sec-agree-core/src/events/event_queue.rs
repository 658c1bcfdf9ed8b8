//! Pending notifications of all agreements of one manager
//!
//! Ordinary entries are bounded by `state_event_capacity`; a push beyond it
//! fails and the caller falls back to terminating the agreement.
//! Termination entries bypass the bound, so cleanup is always delivered.

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::trace;

use super::sec_agree_events::QueuedEvent;
use crate::errors::{SecAgreeError, SecAgreeResult};

#[derive(Debug, Default)]
struct Pending {
    events: VecDeque<QueuedEvent>,
    ordinary: usize,
}

/// FIFO of [`QueuedEvent`]s with a wake-up for the dispatcher task
#[derive(Debug)]
pub struct EventQueue {
    pending: Mutex<Pending>,
    capacity: usize,
    wakeup: Notify,
    drain: Mutex<()>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            capacity,
            wakeup: Notify::new(),
            drain: Mutex::new(()),
        }
    }

    /// Append an entry
    ///
    /// Fails with `OutOfResources` only for ordinary entries.
    pub fn push(&self, event: QueuedEvent) -> SecAgreeResult<()> {
        {
            let mut pending = self.pending.lock();
            if !event.is_termination() {
                if pending.ordinary >= self.capacity {
                    return Err(SecAgreeError::out_of_resources(format!(
                        "event queue holds {} pending notifications",
                        pending.ordinary
                    )));
                }
                pending.ordinary += 1;
            }
            trace!("queued {:?}", event);
            pending.events.push_back(event);
        }
        self.wakeup.notify_one();
        Ok(())
    }

    pub fn pop(&self) -> Option<QueuedEvent> {
        let mut pending = self.pending.lock();
        let event = pending.events.pop_front()?;
        if !event.is_termination() {
            pending.ordinary -= 1;
        }
        Some(event)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim the right to drain
    ///
    /// Returns `None` while another drain is running, including one further
    /// up the calling thread's stack.
    pub fn try_begin_drain(&self) -> Option<MutexGuard<'_, ()>> {
        self.drain.try_lock()
    }

    /// Wait until something is pushed
    pub async fn notified(&self) {
        self.wakeup.notified().await
    }

    pub(crate) fn wake(&self) {
        self.wakeup.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Reason, SecAgreeHandle, SecAgreeState};
    use tokio_test::{assert_pending, assert_ready, task};

    fn state_changed() -> QueuedEvent {
        QueuedEvent::StateChanged {
            handle: SecAgreeHandle::new(0, 1),
            state: SecAgreeState::Idle,
            reason: Reason::Undefined,
        }
    }

    #[test]
    fn test_terminations_bypass_capacity() {
        let queue = EventQueue::new(1);
        queue.push(state_changed()).unwrap();
        let err = queue.push(state_changed()).unwrap_err();
        assert!(matches!(err, SecAgreeError::OutOfResources { .. }));

        let terminated = QueuedEvent::Terminated {
            handle: SecAgreeHandle::new(0, 1),
            reason: Reason::Undefined,
        };
        queue.push(terminated.clone()).unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop(), Some(state_changed()));
        // capacity freed by the pop
        queue.push(state_changed()).unwrap();
        assert_eq!(queue.pop(), Some(terminated));
    }

    #[test]
    fn test_single_drainer() {
        let queue = EventQueue::new(4);
        let first = queue.try_begin_drain();
        assert!(first.is_some());
        assert!(queue.try_begin_drain().is_none());
        drop(first);
        assert!(queue.try_begin_drain().is_some());
    }

    #[test]
    fn test_push_wakes_pending_waiter() {
        let queue = EventQueue::new(4);
        let mut waiter = task::spawn(queue.notified());
        assert_pending!(waiter.poll());

        queue.push(state_changed()).unwrap();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue = std::sync::Arc::new(EventQueue::new(4));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.notified().await })
        };
        queue.push(state_changed()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
