use std::io::{BufRead, BufReader, BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::RequestId;
use crate::policy::Decision;

/// Interactive request as shown to the confirmation UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSummary {
    pub id: RequestId,
    pub uid: i32,
    pub pid: i32,
    pub package_name: String,
    pub display_name: String,
    pub command: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondPayload {
    pub id: RequestId,
    pub decision: Decision,
    /// Positive: remember for that many minutes. Zero: forever. Negative: this
    /// request only.
    pub minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub uptime_seconds: u64,
    pub handled_requests: u64,
    pub pending_requests: u32,
    pub last_decision: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ControlRequest {
    Ping,
    Status,
    ListPending,
    Respond(RespondPayload),
    Reload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ControlResponse {
    Pong,
    Status(StatusPayload),
    Pending(Vec<PendingSummary>),
    Responded { decision: Decision },
    Reloaded,
    Error(ErrorPayload),
}

impl ControlResponse {
    pub fn error(message: impl Into<String>) -> Self {
        ControlResponse::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

fn runtime_path(file: &str) -> PathBuf {
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join("rootgate").join(file);
    }
    PathBuf::from("/tmp").join(file)
}

pub fn default_socket_path() -> PathBuf {
    runtime_path("rootgate.sock")
}

pub fn default_control_socket_path() -> PathBuf {
    runtime_path("rootgate-control.sock")
}

pub fn default_pid_path() -> PathBuf {
    runtime_path("rootgate.pid")
}

/// Request socket the privileged daemon connects to.
pub fn resolve_socket_path(configured: Option<&Path>) -> PathBuf {
    if let Ok(value) = std::env::var("ROOTGATE_SOCKET") {
        return PathBuf::from(value);
    }
    configured.map(Path::to_path_buf).unwrap_or_else(default_socket_path)
}

pub fn resolve_control_socket_path(configured: Option<&Path>) -> PathBuf {
    if let Ok(value) = std::env::var("ROOTGATE_CONTROL_SOCKET") {
        return PathBuf::from(value);
    }
    configured
        .map(Path::to_path_buf)
        .unwrap_or_else(default_control_socket_path)
}

pub fn resolve_pid_path() -> PathBuf {
    if let Ok(value) = std::env::var("ROOTGATE_PID") {
        return PathBuf::from(value);
    }
    default_pid_path()
}

pub fn send_request(socket_path: &Path, request: &ControlRequest) -> Result<ControlResponse> {
    let stream = UnixStream::connect(socket_path)
        .with_context(|| format!("connect to daemon at {}", socket_path.display()))?;
    let mut writer = BufWriter::new(stream.try_clone()?);
    let payload = serde_json::to_string(request).context("serialize request")?;
    writer.write_all(payload.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Err(anyhow::anyhow!("daemon closed the connection without answering"));
    }
    let response = serde_json::from_str(&line).context("parse response")?;
    Ok(response)
}
