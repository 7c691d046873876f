use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use audit::{AuditHandler, JsonlAuditLog, LogNotifier};
use decision_engine::{DecisionEngine, EngineOptions, RegistryResolver};
use policy_store::{CommandPolicyStore, ShellChannel};
use rootgate_core::config::{Config, ConfigPaths};
use rootgate_core::ipc::{resolve_control_socket_path, resolve_pid_path, resolve_socket_path};

mod ipc;
mod pending;
mod scheduler;
mod service;
mod state;

use scheduler::Housekeeping;
use service::Service;
use state::DaemonState;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let paths = ConfigPaths::resolve()?;
    let config_path = std::env::var_os("ROOTGATE_CONFIG").map(PathBuf::from);
    let config = Config::load_or_default(config_path.as_deref(), &paths)?;

    let socket_path = resolve_socket_path(config.daemon.socket_path.as_deref());
    let control_path = resolve_control_socket_path(config.daemon.control_socket_path.as_deref());
    let pid_path = resolve_pid_path();

    let channel = Arc::new(ShellChannel::new(&config.channel));
    let store = Arc::new(CommandPolicyStore::new(channel.clone()));
    let resolver = Arc::new(RegistryResolver::from_file(
        paths.registry_path.clone(),
        config.identity.proc_root.clone(),
    ));
    let log = Arc::new(JsonlAuditLog::new(paths.audit_log_path.clone()));
    let options = EngineOptions::from(&config.superuser);
    let trusted_uids = config.daemon.trusted_uids.clone();

    let state = Arc::new(DaemonState::new(config, config_path, paths));
    let engine = DecisionEngine::new(store.clone(), resolver.clone(), channel, options.clone());
    let audit = AuditHandler::new(
        store.clone(),
        resolver,
        log.clone(),
        Arc::new(LogNotifier),
        options,
    );
    let service = Arc::new(Service::new(engine, audit, state.clone()));

    let requests = ipc::bind(&socket_path)?;
    let control = ipc::bind(&control_path)?;
    write_pid_file(&pid_path)?;
    info!(
        socket = %socket_path.display(),
        control = %control_path.display(),
        "rootgate daemon listening"
    );

    tokio::spawn(Housekeeping::new(store, log, state).run(HOUSEKEEPING_INTERVAL));

    let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let outcome = tokio::select! {
        result = ipc::serve_requests(requests, service.clone(), trusted_uids) => result,
        result = ipc::serve_control(control, service) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
        _ = terminate.recv() => Ok(()),
    };
    if let Err(err) = &outcome {
        error!(error = %format!("{err:#}"), "listener stopped");
    }

    info!("rootgate daemon shutting down");
    for path in [&socket_path, &control_path, &pid_path] {
        let _ = fs::remove_file(path);
    }
    outcome
}

fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create pid dir {}", parent.display()))?;
    }
    let pid = std::process::id();
    fs::write(path, pid.to_string())
        .with_context(|| format!("write pid file {}", path.display()))?;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms)
        .with_context(|| format!("set pid permissions {}", path.display()))?;
    Ok(())
}
