use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use audit::JsonlAuditLog;
use decision_engine::RegistryResolver;
use policy_store::{CommandPolicyStore, PolicyStore, ShellChannel};
use rootgate_core::config::{Config, ConfigPaths};
use rootgate_core::ipc::resolve_control_socket_path;

pub mod config;
pub mod daemon;
pub mod log;
pub mod pending;
pub mod policy;

/// Loaded configuration plus the resolved on-disk locations.
pub struct Session {
    pub config: Config,
    pub paths: ConfigPaths,
}

impl Session {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let paths = ConfigPaths::resolve()?;
        let config = Config::load_or_default(config_path.as_deref(), &paths)?;
        Ok(Self { config, paths })
    }

    pub fn store(&self) -> Arc<dyn PolicyStore> {
        Arc::new(CommandPolicyStore::new(Arc::new(ShellChannel::new(
            &self.config.channel,
        ))))
    }

    pub fn resolver(&self) -> RegistryResolver {
        RegistryResolver::from_file(
            self.paths.registry_path.clone(),
            self.config.identity.proc_root.clone(),
        )
    }

    pub fn audit_log(&self) -> JsonlAuditLog {
        JsonlAuditLog::new(self.paths.audit_log_path.clone())
    }

    pub fn control_socket(&self) -> PathBuf {
        resolve_control_socket_path(self.config.daemon.control_socket_path.as_deref())
    }
}

/// Single-threaded runtime for commands that talk to the policy store or
/// the audit log.
pub fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")
}
