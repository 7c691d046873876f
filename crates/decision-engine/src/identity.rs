//! Maps a requesting uid (and pid) onto an application identity.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use rootgate_core::{app_id, PackageIdentity};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no installed package owns uid {0}")]
    UnknownUid(i32),
    #[error("package registry unavailable: {0}")]
    Registry(String),
}

pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, uid: i32, pid: i32) -> Result<PackageIdentity, IdentityError>;
}

/// Resolves on the blocking pool, since lookups read the registry file and
/// `/proc`.
pub async fn resolve_blocking(
    resolver: &Arc<dyn IdentityResolver>,
    uid: i32,
    pid: i32,
) -> Result<PackageIdentity, IdentityError> {
    let resolver = resolver.clone();
    tokio::task::spawn_blocking(move || resolver.resolve(uid, pid))
        .await
        .map_err(|err| IdentityError::Registry(format!("resolver task failed: {err}")))?
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub uid: i32,
    #[serde(default)]
    pub shared_user: Option<String>,
}

impl PackageEntry {
    fn identity(&self, uid: i32) -> PackageIdentity {
        let label = self.label.clone().unwrap_or_else(|| self.name.clone());
        PackageIdentity::package(uid, self.name.clone(), label)
    }
}

/// Installed packages, as exported by the platform's package manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageRegistry {
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageEntry>,
}

impl PackageRegistry {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let registry = toml::from_str(contents).context("parse package registry TOML")?;
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read package registry {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Packages whose app id matches `uid`, across user profiles.
    pub fn packages_for_uid(&self, uid: i32) -> Vec<&PackageEntry> {
        let wanted = app_id(uid);
        self.packages
            .iter()
            .filter(|entry| app_id(entry.uid) == wanted)
            .collect()
    }
}

enum RegistrySource {
    Fixed(PackageRegistry),
    File(PathBuf),
}

/// Resolver over a [`PackageRegistry`]. When several packages share a uid the
/// requesting process name from `/proc/<pid>/cmdline` picks between them.
pub struct RegistryResolver {
    source: RegistrySource,
    proc_root: PathBuf,
}

impl RegistryResolver {
    pub fn new(registry: PackageRegistry, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            source: RegistrySource::Fixed(registry),
            proc_root: proc_root.into(),
        }
    }

    /// Re-reads `path` on every lookup so package changes apply immediately.
    pub fn from_file(path: impl Into<PathBuf>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            source: RegistrySource::File(path.into()),
            proc_root: proc_root.into(),
        }
    }

    fn with_registry<T>(&self, f: impl FnOnce(&PackageRegistry) -> T) -> Result<T, IdentityError> {
        match &self.source {
            RegistrySource::Fixed(registry) => Ok(f(registry)),
            RegistrySource::File(path) => {
                let registry = PackageRegistry::load(path)
                    .map_err(|err| IdentityError::Registry(format!("{err:#}")))?;
                Ok(f(&registry))
            }
        }
    }

    fn process_name(&self, pid: i32) -> Option<String> {
        let path = self.proc_root.join(pid.to_string()).join("cmdline");
        let raw = fs::read(&path).ok()?;
        let argv0 = raw.split(|byte| *byte == 0).next()?;
        let name = String::from_utf8_lossy(argv0);
        let name = name.split(':').next()?.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

impl IdentityResolver for RegistryResolver {
    fn resolve(&self, uid: i32, pid: i32) -> Result<PackageIdentity, IdentityError> {
        let process = if pid > 0 { self.process_name(pid) } else { None };
        self.with_registry(|registry| {
            let candidates = registry.packages_for_uid(uid);
            match candidates.as_slice() {
                [] => Err(IdentityError::UnknownUid(uid)),
                [only] => Ok(only.identity(uid)),
                many => {
                    if let Some(process) = process.as_deref() {
                        if let Some(entry) = many.iter().find(|entry| entry.name == process) {
                            return Ok(entry.identity(uid));
                        }
                    }
                    debug!(uid, pid, count = many.len(), "uid shared by several packages");
                    let shared = many.iter().find_map(|entry| entry.shared_user.as_deref());
                    Ok(PackageIdentity::shared_uid(uid, shared))
                }
            }
        })?
    }
}
