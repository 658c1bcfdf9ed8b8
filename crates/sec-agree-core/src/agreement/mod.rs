//! Security-agreement objects
//!
//! - [`sec_agree`]: the agreement, its lock discipline and the role-neutral
//!   operations
//! - [`client`]: mechanism choice and the client message drivers
//! - [`server`]: Security-Client / Security-Verify checks and the server
//!   message drivers

pub mod client;
pub mod sec_agree;
pub mod server;

pub use sec_agree::SecAgreement;

/// What a message driver did with a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivedOutcome {
    /// Handled by the agreement it was given to
    Processed,
    /// The agreement cannot take the message; a new one must be negotiated
    ReplacementRequired,
}
