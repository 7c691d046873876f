use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};

use rootgate_core::ipc::{resolve_pid_path, resolve_socket_path, send_request};
use rootgate_core::{ControlRequest, ControlResponse};

use super::Session;

#[derive(Debug)]
pub enum DaemonAction {
    Start {
        socket: Option<PathBuf>,
        pid: Option<PathBuf>,
        config: Option<PathBuf>,
    },
    Stop {
        pid: Option<PathBuf>,
    },
    Ping {
        socket: Option<PathBuf>,
    },
    Status {
        socket: Option<PathBuf>,
    },
    Reload {
        socket: Option<PathBuf>,
    },
    SocketPath,
    PidPath,
}

pub fn execute(session: &Session, action: DaemonAction) -> Result<()> {
    match action {
        DaemonAction::Start { socket, pid, config } => start_daemon(socket, pid, config),
        DaemonAction::Stop { pid } => stop_daemon(pid),
        DaemonAction::Ping { socket } => ping(socket.unwrap_or_else(|| session.control_socket())),
        DaemonAction::Status { socket } => status(socket.unwrap_or_else(|| session.control_socket())),
        DaemonAction::Reload { socket } => reload(socket.unwrap_or_else(|| session.control_socket())),
        DaemonAction::SocketPath => {
            println!(
                "{}",
                resolve_socket_path(session.config.daemon.socket_path.as_deref()).display()
            );
            println!("{}", session.control_socket().display());
            Ok(())
        }
        DaemonAction::PidPath => {
            println!("{}", resolve_pid_path().display());
            Ok(())
        }
    }
}

fn start_daemon(socket: Option<PathBuf>, pid: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let mut cmd = Command::new("rootgate-daemon");
    if let Some(socket) = socket {
        cmd.env("ROOTGATE_SOCKET", socket);
    }
    if let Some(pid) = pid {
        cmd.env("ROOTGATE_PID", pid);
    }
    if let Some(config) = config {
        cmd.env("ROOTGATE_CONFIG", config);
    }
    cmd.spawn().context("start rootgate-daemon")?;
    println!("Rootgate daemon started.");
    Ok(())
}

fn stop_daemon(pid_override: Option<PathBuf>) -> Result<()> {
    let pid_path = pid_override.unwrap_or_else(resolve_pid_path);
    let pid_text = std::fs::read_to_string(&pid_path)
        .with_context(|| format!("read pid file {}", pid_path.display()))?;
    let pid: i32 = pid_text.trim().parse().context("parse pid")?;
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        return Err(anyhow::anyhow!("failed to stop daemon with pid {pid}"));
    }
    println!("Rootgate daemon stopped.");
    Ok(())
}

fn ping(socket: PathBuf) -> Result<()> {
    match send_request(&socket, &ControlRequest::Ping)? {
        ControlResponse::Pong => {
            println!("Rootgate daemon is healthy.");
            Ok(())
        }
        ControlResponse::Error(error) => Err(anyhow::anyhow!(error.message)),
        other => Err(anyhow::anyhow!("unexpected response: {other:?}")),
    }
}

fn status(socket: PathBuf) -> Result<()> {
    match send_request(&socket, &ControlRequest::Status)? {
        ControlResponse::Status(payload) => {
            println!("Rootgate daemon is running.");
            println!("Uptime: {}s", payload.uptime_seconds);
            println!("Handled requests: {}", payload.handled_requests);
            println!("Waiting for confirmation: {}", payload.pending_requests);
            if let Some(last) = payload.last_decision {
                println!("Last decision: {}", last);
            }
            Ok(())
        }
        ControlResponse::Error(error) => Err(anyhow::anyhow!(error.message)),
        other => Err(anyhow::anyhow!("unexpected response: {other:?}")),
    }
}

fn reload(socket: PathBuf) -> Result<()> {
    match send_request(&socket, &ControlRequest::Reload)? {
        ControlResponse::Reloaded => {
            println!("Configuration reloaded.");
            Ok(())
        }
        ControlResponse::Error(error) => Err(anyhow::anyhow!(error.message)),
        other => Err(anyhow::anyhow!("unexpected response: {other:?}")),
    }
}
