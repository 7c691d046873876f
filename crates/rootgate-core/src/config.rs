use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub superuser: SuperuserConfig,
    pub channel: ChannelConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    pub audit: AuditConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperuserConfig {
    pub auto_response: AutoResponse,
    pub restrict: bool,
    pub notification: NotificationMode,
    pub manager_package: String,
    pub default_logging: bool,
    pub default_notification: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutoResponse {
    Ask,
    AlwaysAllow,
    AlwaysDeny,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    None,
    Toast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub helper: String,
    pub helper_args: Vec<String>,
    pub shell: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub socket_path: Option<PathBuf>,
    pub control_socket_path: Option<PathBuf>,
    /// Uids besides root allowed to connect to the request socket.
    #[serde(default)]
    pub trusted_uids: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub proc_root: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

/// The slice of configuration the decision engine looks at, captured once
/// per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionSettings {
    pub auto_response: AutoResponse,
    pub restrict: bool,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            auto_response: AutoResponse::Ask,
            restrict: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub audit_log_path: PathBuf,
    pub registry_path: PathBuf,
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            superuser: SuperuserConfig {
                auto_response: AutoResponse::Ask,
                restrict: false,
                notification: NotificationMode::Toast,
                manager_package: "io.rootgate.manager".to_string(),
                default_logging: true,
                default_notification: true,
            },
            channel: ChannelConfig {
                helper: "magisk".to_string(),
                helper_args: vec!["--sqlite".to_string()],
                shell: "su".to_string(),
            },
            daemon: DaemonConfig::default(),
            audit: AuditConfig { retention_days: 14 },
            identity: IdentityConfig::default(),
        }
    }

    pub fn decision_settings(&self) -> DecisionSettings {
        DecisionSettings {
            auto_response: self.superuser.auto_response,
            restrict: self.superuser.restrict,
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("parse config TOML")?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let output = toml::to_string_pretty(self).context("render config TOML")?;
        Ok(output)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read config at {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Loads `path` when given, otherwise the default location, falling back
    /// to built-in defaults when no file exists there.
    pub fn load_or_default(path: Option<&Path>, paths: &ConfigPaths) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if paths.config_path.exists() => Self::load(&paths.config_path),
            None => Ok(Self::default_config()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let contents = self.to_toml_string()?;
        fs::write(path, contents).with_context(|| format!("write config at {}", path.display()))?;
        Ok(())
    }
}

impl ConfigPaths {
    pub fn resolve() -> Result<Self> {
        let project_dirs = ProjectDirs::from("io", "rootgate", "rootgate")
            .ok_or_else(|| anyhow::anyhow!("unable to determine project directories"))?;
        let config_dir = project_dirs.config_dir();
        let data_dir = project_dirs.data_dir();
        Ok(Self {
            config_path: config_dir.join("config.toml"),
            data_dir: data_dir.to_path_buf(),
            audit_log_path: data_dir.join("audit.jsonl"),
            registry_path: config_dir.join("packages.toml"),
        })
    }
}
