//! Error types for sec-agree-core
//!
//! This module defines the error taxonomy shared by every security-agreement
//! operation, together with the narrower errors raised by the lock substrate
//! and by secure-channel collaborators.

pub mod sec_agree_errors;

// Re-export main error types
pub use sec_agree_errors::{ChannelError, ChannelResult, LockError, SecAgreeError, SecAgreeResult};
