use std::path::PathBuf;
use std::sync::Arc;

use rootgate_core::RequestError;

use crate::fields::{optional_str, reject_unknown, require_int, Fields};
use crate::response::ResponseChannel;

const REQUEST_FIELDS: &[&str] = &["action", "uid", "pid", "fifo", "command"];

/// Validated view of an interactive request's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFields {
    pub uid: i32,
    pub pid: i32,
    pub fifo: Option<PathBuf>,
    pub command: Option<String>,
}

impl RequestFields {
    pub fn from_fields(fields: &Fields) -> Result<Self, RequestError> {
        reject_unknown(fields, REQUEST_FIELDS)?;
        Ok(Self {
            uid: require_int(fields, "uid")?,
            pid: require_int(fields, "pid")?,
            fifo: optional_str(fields, "fifo").map(PathBuf::from),
            command: optional_str(fields, "command"),
        })
    }
}

/// A request in flight, before its requester has been resolved.
pub struct PendingRequest {
    pub uid: i32,
    pub pid: i32,
    pub command: Option<String>,
    pub channel: Arc<dyn ResponseChannel>,
}

impl PendingRequest {
    pub fn new(fields: RequestFields, channel: Arc<dyn ResponseChannel>) -> Self {
        Self {
            uid: fields.uid,
            pid: fields.pid,
            command: fields.command,
            channel,
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.uid <= 0 {
            return Err(RequestError::malformed(format!("invalid uid {}", self.uid)));
        }
        if self.pid <= 0 {
            return Err(RequestError::malformed(format!("invalid pid {}", self.pid)));
        }
        if !self.channel.is_writable() {
            return Err(RequestError::UnwritableChannel(self.channel.describe()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("uid", &self.uid)
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("channel", &self.channel.describe())
            .finish()
    }
}
