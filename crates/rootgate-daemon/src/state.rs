use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use time::OffsetDateTime;

use rootgate_core::{Config, ConfigPaths, DecisionSettings, NotificationMode, StatusPayload};

use crate::pending::PendingRegistry;

struct Counters {
    config: Config,
    handled_requests: u64,
    last_decision: Option<String>,
}

pub struct DaemonState {
    pub started_at: OffsetDateTime,
    pub pending: PendingRegistry,
    config_path: Option<PathBuf>,
    paths: ConfigPaths,
    inner: Mutex<Counters>,
}

impl DaemonState {
    pub fn new(config: Config, config_path: Option<PathBuf>, paths: ConfigPaths) -> Self {
        Self {
            started_at: OffsetDateTime::now_utc(),
            pending: PendingRegistry::default(),
            config_path,
            paths,
            inner: Mutex::new(Counters {
                config,
                handled_requests: 0,
                last_decision: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> Config {
        self.lock().config.clone()
    }

    /// Settings as they are right now; read once per request.
    pub fn decision_settings(&self) -> DecisionSettings {
        self.lock().config.decision_settings()
    }

    pub fn notification_mode(&self) -> NotificationMode {
        self.lock().config.superuser.notification
    }

    pub fn record(&self, summary: impl Into<String>) {
        let mut guard = self.lock();
        guard.handled_requests = guard.handled_requests.saturating_add(1);
        guard.last_decision = Some(summary.into());
    }

    /// Re-reads the config file. The running config is kept if it fails to load.
    pub fn reload(&self) -> Result<()> {
        let config = Config::load_or_default(self.config_path.as_deref(), &self.paths)?;
        self.lock().config = config;
        Ok(())
    }

    pub fn status(&self) -> StatusPayload {
        let guard = self.lock();
        let uptime = OffsetDateTime::now_utc() - self.started_at;
        StatusPayload {
            started_at: self.started_at,
            uptime_seconds: uptime.whole_seconds().max(0) as u64,
            handled_requests: guard.handled_requests,
            pending_requests: u32::try_from(self.pending.len()).unwrap_or(u32::MAX),
            last_decision: guard.last_decision.clone(),
        }
    }
}
