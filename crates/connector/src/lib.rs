//! One daemon connection, serviced exactly once.
//!
//! A [`DaemonConnector`] reads the daemon's field mapping, lets the caller
//! produce a reply, writes it, and then always tears the connection down.
//! Failures after the request was read are logged and swallowed.

use std::io;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, warn};

pub mod wire;

pub use wire::{encode_code, read_fields, write_fields, FieldMap, EOF_MARKER};

pub struct DaemonConnector<S = UnixStream> {
    stream: S,
}

impl<S> DaemonConnector<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub async fn read_request(&mut self) -> io::Result<FieldMap> {
        read_fields(&mut self.stream).await
    }

    /// Resolves once the daemon hangs up. Anything it sends meanwhile is
    /// discarded.
    pub async fn peer_closed(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; 64];
        loop {
            if self.stream.read(&mut scratch).await? == 0 {
                return Ok(());
            }
        }
    }

    /// Runs `write` to build the reply, sends it if there is one, and closes
    /// the connection no matter how the earlier steps went.
    pub async fn respond_with<F>(mut self, write: F)
    where
        F: FnOnce() -> Result<Option<Vec<u8>>>,
    {
        match write() {
            Ok(Some(payload)) => {
                if let Err(err) = self.send(&payload).await {
                    warn!(error = %err, "failed to write daemon response");
                }
            }
            Ok(None) => debug!("no response payload for daemon"),
            Err(err) => warn!(error = %err, "failed to build daemon response"),
        }
        self.close().await;
    }

    /// Writes a single decision code and closes.
    pub async fn respond_code(self, code: i32) {
        self.respond_with(|| Ok(Some(encode_code(code)))).await;
    }

    /// Closes without replying.
    pub async fn close(mut self) {
        if let Err(err) = self.stream.shutdown().await {
            debug!(error = %err, "daemon socket shutdown failed");
        }
        drop(self.stream);
    }

    async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_reply_then_closes() {
        let (mut daemon, app) = tokio::io::duplex(256);
        write_fields(&mut daemon, &[("uid", "10050")]).await.unwrap();

        let mut connector = DaemonConnector::new(app);
        let fields = connector.read_request().await.unwrap();
        assert_eq!(fields["uid"], "10050");
        connector.respond_code(1).await;

        assert_eq!(daemon.read_i32().await.unwrap(), 1);
        let mut rest = Vec::new();
        assert_eq!(daemon.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_writer_still_tears_down() {
        let (mut daemon, app) = tokio::io::duplex(256);
        write_fields(&mut daemon, &[("uid", "10050")]).await.unwrap();

        let mut connector = DaemonConnector::new(app);
        connector.read_request().await.unwrap();
        connector
            .respond_with(|| Err(anyhow::anyhow!("injected failure")))
            .await;

        let mut rest = Vec::new();
        assert_eq!(daemon.read_to_end(&mut rest).await.unwrap(), 0);
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn write_to_vanished_peer_is_swallowed() {
        let (daemon, app) = tokio::io::duplex(8);
        drop(daemon);
        DaemonConnector::new(app).respond_code(2).await;
    }

    #[tokio::test]
    async fn notices_daemon_hangup() {
        let (mut daemon, app) = tokio::io::duplex(256);
        write_fields(&mut daemon, &[("uid", "10050")]).await.unwrap();
        let mut connector = DaemonConnector::new(app);
        connector.read_request().await.unwrap();

        daemon.write_all(b"noise").await.unwrap();
        drop(daemon);
        connector.peer_closed().await.unwrap();
    }

    #[tokio::test]
    async fn unix_socket_is_closed_after_failure() {
        let (mut daemon, app) = UnixStream::pair().unwrap();
        let connector = DaemonConnector::new(app);
        connector
            .respond_with(|| Err(anyhow::anyhow!("injected failure")))
            .await;

        let mut buf = [0u8; 4];
        assert_eq!(daemon.read(&mut buf).await.unwrap(), 0);
    }
}
