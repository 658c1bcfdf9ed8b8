//! Event system for sec-agree-core
//!
//! Operations never call out while they hold an agreement. They queue a
//! [`QueuedEvent`] instead, and the manager's dispatcher delivers it to the
//! application [`SecAgreeEventHandler`], the owners and the broadcast
//! subscribers.

pub mod event_queue;
pub mod handler;
pub mod sec_agree_events;

pub use event_queue::EventQueue;
pub use handler::{NoopEventHandler, SecAgreeEventHandler};
pub use sec_agree_events::{QueuedEvent, SecAgreeEvent};
