use thiserror::Error;

/// Failures a single superuser request can run into. None of these may take
/// down the hosting process; callers degrade to "deny" or "skip audit".
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("unable to resolve identity for uid {uid}: {reason}")]
    UnresolvedIdentity { uid: i32, reason: String },
    #[error("response channel is not writable: {0}")]
    UnwritableChannel(String),
    #[error("failed to write response: {0}")]
    ChannelWriteFailure(String),
    #[error("security violation: {0}")]
    SecurityViolation(String),
}

impl RequestError {
    pub fn malformed(message: impl Into<String>) -> Self {
        RequestError::MalformedRequest(message.into())
    }
}
