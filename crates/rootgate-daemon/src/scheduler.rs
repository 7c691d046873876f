use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use audit::AuditLog;
use policy_store::PolicyStore;

use crate::state::DaemonState;

/// Periodic cleanup of expired policies, audit entries past retention and
/// pending requests nobody can answer any more.
pub struct Housekeeping {
    store: Arc<dyn PolicyStore>,
    log: Arc<dyn AuditLog>,
    state: Arc<DaemonState>,
}

impl Housekeeping {
    pub fn new(store: Arc<dyn PolicyStore>, log: Arc<dyn AuditLog>, state: Arc<DaemonState>) -> Self {
        Self { store, log, state }
    }

    pub async fn run_once(&self) {
        if let Err(err) = self.store.delete_expired().await {
            warn!(error = %err, "expired policy cleanup failed");
        }
        let retention_days = self.state.config().audit.retention_days;
        match self
            .log
            .prune(time::Duration::days(i64::from(retention_days)))
            .await
        {
            Ok(0) => {}
            Ok(removed) => debug!(removed, retention_days, "pruned audit log"),
            Err(err) => warn!(error = %format!("{err:#}"), "audit prune failed"),
        }
        let abandoned = self.state.pending.prune_abandoned();
        if abandoned > 0 {
            debug!(abandoned, "dropped abandoned requests");
        }
    }

    /// Runs forever, starting with an immediate pass.
    pub async fn run(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use audit::JsonlAuditLog;
    use policy_store::testing::SqliteChannel;
    use policy_store::CommandPolicyStore;
    use rootgate_core::{now_unix, AuditLogEntry, Config, ConfigPaths, Decision, DelegationTarget};
    use time::OffsetDateTime;

    use super::*;

    #[tokio::test]
    async fn removes_expired_policies_and_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let sql = Arc::new(SqliteChannel::new());
        sql.insert_raw(10_050, Decision::Allow, now_unix() - 60);
        sql.insert_raw(10_051, Decision::Allow, 0);
        let store = Arc::new(CommandPolicyStore::new(sql));
        let log = Arc::new(JsonlAuditLog::new(dir.path().join("audit.jsonl")));
        for age in [time::Duration::days(40), time::Duration::hours(1)] {
            log.append(&AuditLogEntry {
                from_uid: 10_050,
                to_uid: 0,
                from_pid: 1,
                package_name: "com.example.terminal".to_string(),
                display_name: "Terminal".to_string(),
                command: String::new(),
                decision: Decision::Allow,
                target: DelegationTarget::None,
                security_context: String::new(),
                supplementary_groups: Vec::new(),
                timestamp: OffsetDateTime::now_utc() - age,
            })
            .await
            .unwrap();
        }
        let paths = ConfigPaths {
            config_path: dir.path().join("config.toml"),
            data_dir: dir.path().to_path_buf(),
            audit_log_path: dir.path().join("audit.jsonl"),
            registry_path: dir.path().join("packages.toml"),
        };
        let state = Arc::new(DaemonState::new(Config::default_config(), None, paths));

        Housekeeping::new(store.clone(), log.clone(), state).run_once().await;

        assert_eq!(store.fetch(10_050).await.unwrap(), None);
        assert!(store.fetch(10_051).await.unwrap().is_some());
        assert_eq!(log.entries().await.unwrap().len(), 1);
    }
}
