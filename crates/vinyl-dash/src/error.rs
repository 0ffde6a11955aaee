use thiserror::Error;

/// Why a fetch or command did not produce the expected result.
///
/// Every failure is recovered locally by the component that hit it; this
/// type only travels as far as the caller that wants to know what happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The request never produced a response (refused, reset, timed out).
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx status or a body that does not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The server answered but reports the physical display as offline.
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),
    /// Local input rejected before anything was sent.
    #[error("invalid input: {0}")]
    Validation(String),
}

impl SyncError {
    /// Message without the category prefix, for inline status text.
    pub fn detail(&self) -> &str {
        match self {
            Self::Network(m) | Self::Protocol(m) | Self::DeviceUnreachable(m) | Self::Validation(m) => m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// Destructive action attempted without explicit user confirmation.
    #[error("{0} requires confirmation")]
    NotConfirmed(&'static str),
    /// An earlier request for the same control has not resolved yet.
    #[error("{0} request already pending")]
    Busy(&'static str),
}
