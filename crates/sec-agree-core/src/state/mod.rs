//! Security-agreement state machine
//!
//! - [`machine`]: the transition table and the secure-channel predicates
//! - [`status`]: IPsec association-status tracking

pub mod machine;
pub mod status;

pub use machine::{
    client_is_choosing, next_transition, should_activate_channel, should_construct_channel,
    ProcessingEvent, ReceivedSummary, Transition,
};
pub use status::{consider_new_status, status_notification, StatusContext, StatusTrigger};
