//! Errors reported by the communication interface.

use thiserror::Error;

/// The interface was asked to do something that isn't allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageError {
    /// Prototypes carrying the reserved handle can't be registered.
    #[error("prototype handle {0} is reserved")]
    ReservedPrototype(u8),
    /// No prototype is registered under this handle.
    #[error("no prototype registered with handle {0}")]
    UnknownPrototype(u8),
    /// Only requests can be acknowledged. The response was still sent.
    #[error("acknowledgment requested for response {0}, only requests are acknowledged")]
    AckOnResponse(u16),
}

/// Everything that can go wrong while sending, listening, or ticking.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("channel error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Usage(#[from] UsageError),
    /// A user callback returned an error. Remaining callbacks for that message were
    /// skipped.
    #[error("callback failed: {0}")]
    Callback(#[source] crate::CallbackError),
}

impl InterfaceError {
    /// Returns the usage error, if this is one.
    #[inline(always)]
    pub fn as_usage(&self) -> Option<UsageError> {
        match self {
            Self::Usage(e) => Some(*e),
            _ => None,
        }
    }
}
