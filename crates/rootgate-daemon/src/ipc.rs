use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use nix::unistd::geteuid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use rootgate_core::{ControlRequest, ControlResponse};

use crate::service::Service;

/// Binds `socket_path`, replacing a stale socket left by an earlier run.
pub fn bind(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create socket dir {}", parent.display()))?;
    }
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .with_context(|| format!("remove stale socket {}", socket_path.display()))?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("bind socket {}", socket_path.display()))?;
    fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("set socket permissions {}", socket_path.display()))?;
    Ok(listener)
}

/// Accepts connections from the privileged daemon. Only root, our own uid,
/// and `trusted_uids` may connect.
pub async fn serve_requests(listener: UnixListener, service: Arc<Service>, trusted_uids: Vec<u32>) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await.context("accept daemon connection")?;
        if let Err(err) = check_peer_uid(&stream, |uid| {
            uid == 0 || uid == geteuid().as_raw() || trusted_uids.contains(&uid)
        }) {
            warn!(error = %err, "refusing daemon connection");
            continue;
        }
        let service = service.clone();
        tokio::spawn(async move { service.handle_connection(stream).await });
    }
}

/// Accepts JSON-lines control clients running as our own uid.
pub async fn serve_control(listener: UnixListener, service: Arc<Service>) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await.context("accept control connection")?;
        if let Err(err) = check_peer_uid(&stream, |uid| uid == geteuid().as_raw()) {
            warn!(error = %err, "refusing control connection");
            continue;
        }
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_control_connection(stream, &service).await {
                warn!(error = %format!("{err:#}"), "control connection failed");
            }
        });
    }
}

async fn handle_control_connection(stream: UnixStream, service: &Service) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let bytes = reader.read_line(&mut line).await?;
    if bytes == 0 {
        return Ok(());
    }

    let response = match serde_json::from_str::<ControlRequest>(&line) {
        Ok(request) => {
            debug!(?request, "control request");
            service.control(request).await
        }
        Err(err) => ControlResponse::error(format!("parse request: {err}")),
    };

    let payload = serde_json::to_string(&response).context("serialize response")?;
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

fn check_peer_uid(stream: &UnixStream, allowed: impl Fn(u32) -> bool) -> Result<()> {
    let cred = stream.peer_cred().context("failed to read peer credentials")?;
    if !allowed(cred.uid()) {
        return Err(anyhow::anyhow!("unauthorized peer uid {}", cred.uid()));
    }
    Ok(())
}
