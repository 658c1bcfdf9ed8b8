//! Security-agreement error definitions
//!
//! Every public operation returns [`SecAgreeResult`]. The variants follow the
//! kinds a caller has to tell apart:
//!
//! - **InvalidArgument**: bad input, nothing was mutated
//! - **OutOfResources**: arena, owner table or event queue exhausted
//! - **Destructed**: the handle refers to an agreement that no longer exists
//! - **IllegalAction**: the current state does not allow the operation
//! - **Channel**: a secure-channel collaborator failed
//!
//! [`LockError`] and [`ChannelError`] are raised by the lock substrate and by
//! secure-channel implementations respectively and convert into
//! [`SecAgreeError`] with `?`.

use thiserror::Error;

/// Result type for security-agreement operations
pub type SecAgreeResult<T> = Result<T, SecAgreeError>;

/// Result type returned by secure-channel implementations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur while driving a security-agreement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecAgreeError {
    /// Null, empty or out-of-range input
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Arena, owner table or queue exhaustion
    #[error("Out of resources: {message}")]
    OutOfResources { message: String },

    /// Generation mismatch at lock time
    #[error("Security-agreement {handle} was destructed")]
    Destructed { handle: String },

    /// State-machine guard violated
    #[error("Illegal action: {message}")]
    IllegalAction { message: String },

    /// Secure-channel collaborator failure
    #[error("Secure channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Lookup of an element that does not exist
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Configuration rejected by validation or parsing
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SecAgreeError {
    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Create an out-of-resources error
    pub fn out_of_resources(message: impl Into<String>) -> Self {
        Self::OutOfResources { message: message.into() }
    }

    /// Create a destructed error for the given handle description
    pub fn destructed(handle: impl ToString) -> Self {
        Self::Destructed { handle: handle.to_string() }
    }

    /// Create an illegal-action error
    pub fn illegal_action(message: impl Into<String>) -> Self {
        Self::IllegalAction { message: message.into() }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// True when the error only says the handle is stale
    pub fn is_destructed(&self) -> bool {
        matches!(self, Self::Destructed { .. })
    }

    /// True when retrying later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfResources { .. } | Self::Channel(ChannelError::Resource { .. }))
    }
}

/// Errors raised by the lock substrate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The object's generation id changed (or was reset) since the handle was issued
    #[error("object generation {expected} is no longer live")]
    Destructed { expected: u64 },
}

impl From<LockError> for SecAgreeError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Destructed { expected } => SecAgreeError::Destructed {
                handle: format!("generation {}", expected),
            },
        }
    }
}

/// Errors reported by a secure-channel implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel could not allocate SPIs, ports or sockets
    #[error("resource failure: {message}")]
    Resource { message: String },

    /// A parameter was rejected by the channel
    #[error("parameter rejected: {message}")]
    Parameter { message: String },

    /// The channel is already closed or terminated
    #[error("channel closed")]
    Closed,
}

impl ChannelError {
    /// Create a resource failure
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource { message: message.into() }
    }

    /// Create a parameter failure
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter { message: message.into() }
    }
}
