//! Records decisions the daemon settled on its own.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use decision_engine::identity::resolve_blocking;
use decision_engine::{EngineOptions, IdentityError, IdentityResolver};
use policy_store::PolicyStore;
use rootgate_core::{AuditLogEntry, Decision, NotificationMode, PackageIdentity, PolicyRecord};

pub mod json;
pub mod log;
pub mod notify;
pub mod report;
pub mod timeline;

pub use log::{AuditLog, JsonlAuditLog};
pub use notify::{LogNotifier, MemoryNotifier, Notifier};
pub use report::{LogReport, NotifyReport};

/// What happened to one passive report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditOutcome {
    pub logged: bool,
    pub notified: bool,
    /// The requester no longer resolved and its stored policy was dropped.
    pub identity_lost: bool,
}

pub struct AuditHandler {
    store: Arc<dyn PolicyStore>,
    resolver: Arc<dyn IdentityResolver>,
    log: Arc<dyn AuditLog>,
    notifier: Arc<dyn Notifier>,
    options: EngineOptions,
}

impl AuditHandler {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        resolver: Arc<dyn IdentityResolver>,
        log: Arc<dyn AuditLog>,
        notifier: Arc<dyn Notifier>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            resolver,
            log,
            notifier,
            options,
        }
    }

    /// Appends the report to the audit log unless logging is off for the
    /// requester, then acknowledges it if asked to. Failures only reduce what
    /// gets recorded.
    pub async fn handle_log(&self, report: &LogReport, mode: NotificationMode) -> AuditOutcome {
        let (identity, identity_lost) = self.identity(report.from_uid, report.pid).await;
        let record = self.record(report.from_uid).await;
        let mut outcome = AuditOutcome {
            identity_lost,
            ..AuditOutcome::default()
        };

        if record.logging {
            let entry = AuditLogEntry {
                from_uid: report.from_uid,
                to_uid: report.to_uid,
                from_pid: report.pid,
                package_name: identity.package_name.clone(),
                display_name: identity.display_name.clone(),
                command: report.command.clone(),
                decision: report.decision,
                target: report.target,
                security_context: report.security_context.clone(),
                supplementary_groups: report.supplementary_groups.clone(),
                timestamp: OffsetDateTime::now_utc(),
            };
            match self.log.append(&entry).await {
                Ok(()) => outcome.logged = true,
                Err(err) => warn!(uid = report.from_uid, error = %format!("{err:#}"), "audit append failed"),
            }
        } else {
            debug!(uid = report.from_uid, "logging disabled for requester");
        }

        let wants_notification = report.notify.unwrap_or(record.notification);
        outcome.notified = self.acknowledge(&identity, report.decision, wants_notification, mode);
        outcome
    }

    pub async fn handle_notify(&self, report: &NotifyReport, mode: NotificationMode) -> AuditOutcome {
        let (identity, identity_lost) = self.identity(report.from_uid, report.pid).await;
        let record = self.record(report.from_uid).await;
        AuditOutcome {
            logged: false,
            notified: self.acknowledge(&identity, report.decision, record.notification, mode),
            identity_lost,
        }
    }

    async fn identity(&self, uid: i32, pid: i32) -> (PackageIdentity, bool) {
        match resolve_blocking(&self.resolver, uid, pid).await {
            Ok(identity) => (identity, false),
            Err(IdentityError::UnknownUid(_)) => {
                warn!(uid, pid, "reporting uid no longer resolves, dropping its policy");
                if let Err(err) = self.store.delete(uid).await {
                    warn!(uid, error = %err, "failed to drop stale policy");
                }
                (PackageIdentity::shared_uid(uid, None), true)
            }
            Err(err) => {
                warn!(uid, pid, error = %err, "identity lookup failed, keeping stored policy");
                (PackageIdentity::shared_uid(uid, None), false)
            }
        }
    }

    async fn record(&self, uid: i32) -> PolicyRecord {
        match self.store.fetch(uid).await {
            Ok(Some(record)) => record,
            Ok(None) => self.default_record(uid),
            Err(err) => {
                warn!(uid, error = %err, "policy lookup failed, using defaults");
                self.default_record(uid)
            }
        }
    }

    fn default_record(&self, uid: i32) -> PolicyRecord {
        PolicyRecord::new(uid, self.options.default_logging, self.options.default_notification)
    }

    fn acknowledge(
        &self,
        identity: &PackageIdentity,
        decision: Decision,
        wanted: bool,
        mode: NotificationMode,
    ) -> bool {
        if wanted && mode == NotificationMode::Toast {
            self.notifier.notify(identity, decision);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use decision_engine::{PackageRegistry, RegistryResolver};
    use policy_store::testing::SqliteChannel;
    use policy_store::CommandPolicyStore;
    use rootgate_core::{DelegationTarget, Expiry};

    use super::*;

    const REGISTRY: &str = r#"
        [[package]]
        name = "com.example.terminal"
        label = "Terminal"
        uid = 10050
    "#;

    struct Harness {
        handler: AuditHandler,
        store: Arc<CommandPolicyStore>,
        log: Arc<JsonlAuditLog>,
        notifier: Arc<MemoryNotifier>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        harness_with(|dir| {
            RegistryResolver::new(PackageRegistry::from_toml_str(REGISTRY).unwrap(), dir)
        })
    }

    fn harness_with(resolver: impl FnOnce(&std::path::Path) -> RegistryResolver) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CommandPolicyStore::new(Arc::new(SqliteChannel::new())));
        let resolver = Arc::new(resolver(dir.path()));
        let log = Arc::new(JsonlAuditLog::new(dir.path().join("audit.jsonl")));
        let notifier = Arc::new(MemoryNotifier::default());
        let handler = AuditHandler::new(
            store.clone(),
            resolver,
            log.clone(),
            notifier.clone(),
            EngineOptions {
                manager_package: "io.rootgate.manager".to_string(),
                default_logging: true,
                default_notification: true,
            },
        );
        Harness {
            handler,
            store,
            log,
            notifier,
            _dir: dir,
        }
    }

    fn report(uid: i32) -> LogReport {
        LogReport {
            from_uid: uid,
            to_uid: 0,
            pid: 1234,
            decision: Decision::Allow,
            command: "id".to_string(),
            notify: None,
            target: DelegationTarget::None,
            security_context: "u:r:untrusted_app:s0".to_string(),
            supplementary_groups: vec![3003],
        }
    }

    fn record(uid: i32, logging: bool, notification: bool) -> PolicyRecord {
        PolicyRecord {
            uid,
            decision: Decision::Allow,
            expiry: Expiry::Forever,
            logging,
            notification,
        }
    }

    #[tokio::test]
    async fn log_report_is_appended_and_acknowledged() {
        let h = harness();
        let outcome = h.handler.handle_log(&report(10_050), NotificationMode::Toast).await;
        assert_eq!(
            outcome,
            AuditOutcome {
                logged: true,
                notified: true,
                identity_lost: false
            }
        );

        let entries = h.log.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].package_name, "com.example.terminal");
        assert_eq!(entries[0].display_name, "Terminal");
        assert_eq!(entries[0].security_context, "u:r:untrusted_app:s0");
        assert_eq!(entries[0].supplementary_groups, vec![3003]);

        let seen = h.notifier.take();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, Decision::Allow);
    }

    #[tokio::test]
    async fn logging_flag_off_skips_append() {
        let h = harness();
        h.store.upsert(&record(10_050, false, true)).await.unwrap();
        let outcome = h.handler.handle_log(&report(10_050), NotificationMode::None).await;
        assert!(!outcome.logged);
        assert!(!outcome.notified);
        assert!(h.log.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_reporter_drops_policy_but_is_logged() {
        let h = harness();
        h.store.upsert(&record(10_999, true, false)).await.unwrap();

        let outcome = h.handler.handle_log(&report(10_999), NotificationMode::Toast).await;
        assert!(outcome.identity_lost);
        assert!(outcome.logged);
        assert_eq!(h.store.fetch(10_999).await.unwrap(), None);

        let entries = h.log.entries().await.unwrap();
        assert_eq!(entries[0].display_name, "[SharedUID] 10999");
    }

    #[tokio::test]
    async fn unreadable_registry_keeps_stored_policy() {
        let h = harness_with(|dir| RegistryResolver::from_file(dir.join("missing.toml"), dir));
        h.store.upsert(&record(10_050, true, false)).await.unwrap();

        let outcome = h.handler.handle_log(&report(10_050), NotificationMode::Toast).await;
        assert!(!outcome.identity_lost);
        assert!(outcome.logged);
        assert!(!outcome.notified);
        let stored = h.store.fetch(10_050).await.unwrap().unwrap();
        assert_eq!(stored.decision, Decision::Allow);
    }

    #[tokio::test]
    async fn explicit_notify_field_wins_over_record() {
        let h = harness();
        h.store.upsert(&record(10_050, true, true)).await.unwrap();
        let mut quiet = report(10_050);
        quiet.notify = Some(false);
        let outcome = h.handler.handle_log(&quiet, NotificationMode::Toast).await;
        assert!(outcome.logged);
        assert!(!outcome.notified);
        assert!(h.notifier.take().is_empty());
    }

    #[tokio::test]
    async fn notify_report_respects_mode_and_record() {
        let h = harness();
        let report = NotifyReport {
            from_uid: 10_050,
            pid: 1234,
            decision: Decision::Deny,
        };

        assert!(!h.handler.handle_notify(&report, NotificationMode::None).await.notified);
        assert!(h.handler.handle_notify(&report, NotificationMode::Toast).await.notified);

        h.store.upsert(&record(10_050, true, false)).await.unwrap();
        let outcome = h.handler.handle_notify(&report, NotificationMode::Toast).await;
        assert!(!outcome.notified);
        assert!(!outcome.logged);
        assert_eq!(h.notifier.take().len(), 1);
        assert!(h.log.entries().await.unwrap().is_empty());
    }
}
