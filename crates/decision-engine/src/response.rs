use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::{access, AccessFlags};
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

use rootgate_core::{Decision, RequestError};

/// Where a request's decision code goes.
#[async_trait]
pub trait ResponseChannel: Send + Sync {
    fn describe(&self) -> String;

    fn is_writable(&self) -> bool;

    async fn write_decision(&self, decision: Decision) -> Result<(), RequestError>;
}

/// Named pipe created by the daemon for this request.
#[derive(Debug, Clone)]
pub struct FifoChannel {
    path: PathBuf,
}

impl FifoChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResponseChannel for FifoChannel {
    fn describe(&self) -> String {
        format!("fifo {}", self.path.display())
    }

    fn is_writable(&self) -> bool {
        access(self.path.as_path(), AccessFlags::W_OK).is_ok()
    }

    /// Fails straight away when nobody is reading the fifo any more.
    async fn write_decision(&self, decision: Decision) -> Result<(), RequestError> {
        let failure = |err: std::io::Error| {
            if err.raw_os_error() == Some(Errno::ENXIO as i32) {
                RequestError::ChannelWriteFailure(format!("{}: no reader", self.path.display()))
            } else {
                RequestError::ChannelWriteFailure(format!("{}: {err}", self.path.display()))
            }
        };
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&self.path)
            .await
            .map_err(failure)?;
        file.write_i32(decision.code()).await.map_err(failure)?;
        file.flush().await.map_err(failure)?;
        Ok(())
    }
}

/// Hands the decision back to the connection that carried the request.
pub struct ReplyChannel {
    sender: Mutex<Option<oneshot::Sender<Decision>>>,
}

pub fn reply_channel() -> (ReplyChannel, oneshot::Receiver<Decision>) {
    let (sender, receiver) = oneshot::channel();
    (
        ReplyChannel {
            sender: Mutex::new(Some(sender)),
        },
        receiver,
    )
}

#[async_trait]
impl ResponseChannel for ReplyChannel {
    fn describe(&self) -> String {
        "daemon connection".to_string()
    }

    fn is_writable(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }

    async fn write_decision(&self, decision: Decision) -> Result<(), RequestError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| RequestError::ChannelWriteFailure("already answered".to_string()))?;
        sender.send(decision).map_err(|_| {
            RequestError::ChannelWriteFailure("daemon connection is gone".to_string())
        })
    }
}
