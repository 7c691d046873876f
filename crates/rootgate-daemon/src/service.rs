use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use audit::{AuditHandler, LogReport, NotifyReport};
use connector::{DaemonConnector, FieldMap};
use decision_engine::{
    reply_channel, DecisionEngine, FifoChannel, PendingRequest, RequestFields, StartOutcome,
};
use rootgate_core::{ControlRequest, ControlResponse, Decision, RespondPayload};

use crate::state::DaemonState;

/// Everything a daemon connection or a control client can reach.
pub struct Service {
    engine: DecisionEngine,
    audit: AuditHandler,
    state: Arc<DaemonState>,
}

impl Service {
    pub fn new(engine: DecisionEngine, audit: AuditHandler, state: Arc<DaemonState>) -> Self {
        Self {
            engine,
            audit,
            state,
        }
    }

    pub fn state(&self) -> &Arc<DaemonState> {
        &self.state
    }

    /// Services one connection from the privileged daemon.
    pub async fn handle_connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut connector = DaemonConnector::new(stream);
        let fields = match connector.read_request().await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(error = %err, "unreadable daemon request");
                connector.close().await;
                return;
            }
        };

        match fields.get("action").map(String::as_str) {
            Some("request") => self.handle_request(connector, &fields).await,
            Some("log") => {
                connector.close().await;
                match LogReport::from_fields(&fields) {
                    Ok(report) => {
                        let outcome = self
                            .audit
                            .handle_log(&report, self.state.notification_mode())
                            .await;
                        debug!(uid = report.from_uid, ?outcome, "log report handled");
                    }
                    Err(err) => warn!(error = %err, "rejecting log report"),
                }
            }
            Some("notify") => {
                connector.close().await;
                match NotifyReport::from_fields(&fields) {
                    Ok(report) => {
                        let outcome = self
                            .audit
                            .handle_notify(&report, self.state.notification_mode())
                            .await;
                        debug!(uid = report.from_uid, ?outcome, "notify report handled");
                    }
                    Err(err) => warn!(error = %err, "rejecting notify report"),
                }
            }
            other => {
                warn!(action = ?other, "unknown daemon action");
                connector.close().await;
            }
        }
    }

    async fn handle_request<S>(&self, mut connector: DaemonConnector<S>, fields: &FieldMap)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let parsed = match RequestFields::from_fields(fields) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "rejecting superuser request");
                connector.close().await;
                return;
            }
        };

        match parsed.fifo.clone() {
            Some(path) => {
                connector.close().await;
                let request = PendingRequest::new(parsed, Arc::new(FifoChannel::new(path)));
                self.start(request).await;
            }
            None => {
                let (channel, receiver) = reply_channel();
                let request = PendingRequest::new(parsed, Arc::new(channel));
                self.start(request).await;
                let answer = tokio::select! {
                    answer = receiver => answer.ok(),
                    _ = connector.peer_closed() => None,
                };
                match answer {
                    Some(decision) => connector.respond_code(decision.code()).await,
                    None => connector.close().await,
                }
            }
        }
    }

    async fn start(&self, request: PendingRequest) {
        let uid = request.uid;
        let outcome = self.engine.start(request, self.state.decision_settings()).await;
        match outcome {
            StartOutcome::NeedsInteraction(pending) => {
                let id = self.state.pending.insert(pending);
                info!(%id, uid, "request waiting for confirmation");
            }
            StartOutcome::AutoResolved(decision) => {
                self.state.record(format!("uid {uid}: {decision}"));
            }
            other => self.state.record(format!("uid {uid}: {}", other.state())),
        }
    }

    /// Answers one control-socket message.
    pub async fn control(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Ping => ControlResponse::Pong,
            ControlRequest::Status => ControlResponse::Status(self.state.status()),
            ControlRequest::ListPending => ControlResponse::Pending(self.state.pending.list()),
            ControlRequest::Respond(payload) => self.respond(payload).await,
            ControlRequest::Reload => match self.state.reload() {
                Ok(()) => {
                    info!("configuration reloaded");
                    ControlResponse::Reloaded
                }
                Err(err) => ControlResponse::error(format!("{err:#}")),
            },
        }
    }

    async fn respond(&self, payload: RespondPayload) -> ControlResponse {
        if !matches!(payload.decision, Decision::Allow | Decision::Deny) {
            return ControlResponse::error(format!(
                "cannot answer with {}; use allow or deny",
                payload.decision
            ));
        }
        let Some(pending) = self.state.pending.take(&payload.id) else {
            return ControlResponse::error(format!("no pending request {}", payload.id));
        };
        let uid = pending.uid();
        let sent = pending.respond(payload.decision, payload.minutes).await;
        self.state.record(format!("uid {uid}: {sent}"));
        ControlResponse::Responded { decision: sent }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use audit::{AuditLog, JsonlAuditLog, MemoryNotifier};
    use connector::write_fields;
    use decision_engine::{EngineOptions, PackageRegistry, RegistryResolver};
    use policy_store::testing::SqliteChannel;
    use policy_store::{CommandPolicyStore, PolicyStore};
    use rootgate_core::{AutoResponse, Config, ConfigPaths, PendingSummary};
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::scheduler::Housekeeping;

    const REGISTRY: &str = r#"
        [[package]]
        name = "com.example.terminal"
        label = "Terminal"
        uid = 10050
    "#;

    struct Harness {
        service: Arc<Service>,
        store: Arc<CommandPolicyStore>,
        log: Arc<JsonlAuditLog>,
        dir: tempfile::TempDir,
    }

    fn harness(auto_response: AutoResponse) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let sql = Arc::new(SqliteChannel::new());
        let store = Arc::new(CommandPolicyStore::new(sql.clone()));
        let resolver = Arc::new(RegistryResolver::new(
            PackageRegistry::from_toml_str(REGISTRY).unwrap(),
            dir.path(),
        ));
        let log = Arc::new(JsonlAuditLog::new(dir.path().join("audit.jsonl")));

        let mut config = Config::default_config();
        config.superuser.auto_response = auto_response;
        let options = EngineOptions::from(&config.superuser);
        let paths = ConfigPaths {
            config_path: dir.path().join("config.toml"),
            data_dir: dir.path().to_path_buf(),
            audit_log_path: dir.path().join("audit.jsonl"),
            registry_path: dir.path().join("packages.toml"),
        };
        let state = Arc::new(DaemonState::new(config, None, paths));

        let engine = DecisionEngine::new(store.clone(), resolver.clone(), sql, options.clone());
        let audit = AuditHandler::new(
            store.clone(),
            resolver,
            log.clone(),
            Arc::new(MemoryNotifier::default()),
            options,
        );
        Harness {
            service: Arc::new(Service::new(engine, audit, state)),
            store,
            log,
            dir,
        }
    }

    async fn wait_for_pending(service: &Service) -> PendingSummary {
        for _ in 0..100 {
            if let Some(summary) = service.state().pending.list().into_iter().next() {
                return summary;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("request never became pending");
    }

    #[tokio::test]
    async fn auto_response_is_written_back_on_the_connection() {
        let h = harness(AutoResponse::AlwaysDeny);
        let (mut daemon, app) = tokio::io::duplex(1024);
        write_fields(
            &mut daemon,
            &[("action", "request"), ("uid", "10050"), ("pid", "1234")],
        )
        .await
        .unwrap();

        h.service.handle_connection(app).await;
        assert_eq!(daemon.read_i32().await.unwrap(), Decision::Deny.code());
        let mut rest = Vec::new();
        assert_eq!(daemon.read_to_end(&mut rest).await.unwrap(), 0);
        assert_eq!(h.service.state().status().handled_requests, 1);
    }

    #[tokio::test]
    async fn interactive_request_is_answered_through_control() {
        let h = harness(AutoResponse::Ask);
        let (mut daemon, app) = tokio::io::duplex(1024);
        write_fields(
            &mut daemon,
            &[
                ("action", "request"),
                ("uid", "10050"),
                ("pid", "1234"),
                ("command", "id"),
            ],
        )
        .await
        .unwrap();

        let service = h.service.clone();
        let connection = tokio::spawn(async move { service.handle_connection(app).await });
        let summary = wait_for_pending(&h.service).await;
        assert_eq!(summary.display_name, "Terminal");
        assert_eq!(summary.command.as_deref(), Some("id"));

        let response = h
            .service
            .control(ControlRequest::Respond(RespondPayload {
                id: summary.id,
                decision: Decision::Allow,
                minutes: 10,
            }))
            .await;
        assert!(matches!(
            response,
            ControlResponse::Responded {
                decision: Decision::Allow
            }
        ));

        assert_eq!(daemon.read_i32().await.unwrap(), Decision::Allow.code());
        connection.await.unwrap();
        let stored = h.store.fetch(10_050).await.unwrap().unwrap();
        assert_eq!(stored.decision, Decision::Allow);

        let again = h
            .service
            .control(ControlRequest::Respond(RespondPayload {
                id: summary.id,
                decision: Decision::Deny,
                minutes: 0,
            }))
            .await;
        assert!(matches!(again, ControlResponse::Error(_)));
    }

    #[tokio::test]
    async fn abandoned_request_leaves_the_pending_list() {
        let h = harness(AutoResponse::Ask);
        let (mut daemon, app) = tokio::io::duplex(1024);
        write_fields(
            &mut daemon,
            &[("action", "request"), ("uid", "10050"), ("pid", "1234")],
        )
        .await
        .unwrap();

        let service = h.service.clone();
        let connection = tokio::spawn(async move { service.handle_connection(app).await });
        wait_for_pending(&h.service).await;

        drop(daemon);
        connection.await.unwrap();
        assert!(h.service.state().pending.list().is_empty());
    }

    #[tokio::test]
    async fn fifo_request_answers_through_the_fifo() {
        let h = harness(AutoResponse::AlwaysAllow);
        let fifo = h.dir.path().join("fifo");
        std::fs::write(&fifo, b"").unwrap();
        let fifo_arg = fifo.display().to_string();

        let (mut daemon, app) = tokio::io::duplex(1024);
        write_fields(
            &mut daemon,
            &[
                ("action", "request"),
                ("uid", "10050"),
                ("pid", "1234"),
                ("fifo", fifo_arg.as_str()),
            ],
        )
        .await
        .unwrap();

        h.service.handle_connection(app).await;
        let mut rest = Vec::new();
        assert_eq!(daemon.read_to_end(&mut rest).await.unwrap(), 0);
        assert_eq!(std::fs::read(&fifo).unwrap(), vec![0, 0, 0, 2]);
    }

    #[tokio::test]
    async fn housekeeping_drops_requests_whose_fifo_is_gone() {
        let h = harness(AutoResponse::Ask);
        let fifo = h.dir.path().join("fifo");
        std::fs::write(&fifo, b"").unwrap();
        let fifo_arg = fifo.display().to_string();

        let (mut daemon, app) = tokio::io::duplex(1024);
        write_fields(
            &mut daemon,
            &[
                ("action", "request"),
                ("uid", "10050"),
                ("pid", "1234"),
                ("fifo", fifo_arg.as_str()),
            ],
        )
        .await
        .unwrap();
        h.service.handle_connection(app).await;
        assert_eq!(h.service.state().pending.len(), 1);

        std::fs::remove_file(&fifo).unwrap();
        Housekeeping::new(h.store.clone(), h.log.clone(), h.service.state().clone())
            .run_once()
            .await;
        assert_eq!(h.service.state().pending.len(), 0);
    }

    #[tokio::test]
    async fn log_report_lands_in_the_audit_log() {
        let h = harness(AutoResponse::Ask);
        let (mut daemon, app) = tokio::io::duplex(1024);
        write_fields(
            &mut daemon,
            &[
                ("action", "log"),
                ("from.uid", "10050"),
                ("to.uid", "0"),
                ("pid", "1234"),
                ("policy", "2"),
                ("command", "id"),
            ],
        )
        .await
        .unwrap();

        h.service.handle_connection(app).await;
        let mut rest = Vec::new();
        assert_eq!(daemon.read_to_end(&mut rest).await.unwrap(), 0);
        let entries = h.log.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].package_name, "com.example.terminal");
    }

    #[tokio::test]
    async fn malformed_connections_are_closed_silently() {
        let h = harness(AutoResponse::AlwaysAllow);
        for fields in [
            vec![("action", "reboot")],
            vec![("uid", "10050"), ("pid", "1")],
            vec![("action", "request"), ("uid", "10050"), ("pid", "1"), ("bogus", "1")],
        ] {
            let (mut daemon, app) = tokio::io::duplex(1024);
            write_fields(&mut daemon, fields.as_slice()).await.unwrap();
            h.service.handle_connection(app).await;
            let mut rest = Vec::new();
            assert_eq!(daemon.read_to_end(&mut rest).await.unwrap(), 0);
        }
        assert_eq!(h.store.fetch(10_050).await.unwrap(), None);
    }

    #[tokio::test]
    async fn control_rejects_query_answers_and_reports_status() {
        let h = harness(AutoResponse::Ask);
        assert!(matches!(
            h.service.control(ControlRequest::Ping).await,
            ControlResponse::Pong
        ));

        let response = h
            .service
            .control(ControlRequest::Respond(RespondPayload {
                id: rootgate_core::RequestId::new(),
                decision: Decision::Query,
                minutes: 0,
            }))
            .await;
        assert!(matches!(response, ControlResponse::Error(_)));

        let ControlResponse::Status(status) = h.service.control(ControlRequest::Status).await else {
            panic!("expected status");
        };
        assert_eq!(status.handled_requests, 0);
        assert_eq!(status.pending_requests, 0);
    }

    #[tokio::test]
    async fn reload_picks_up_config_changes() {
        let h = harness(AutoResponse::Ask);
        let mut config = Config::default_config();
        config.superuser.auto_response = AutoResponse::AlwaysDeny;
        config.save(&h.dir.path().join("config.toml")).unwrap();

        assert!(matches!(
            h.service.control(ControlRequest::Reload).await,
            ControlResponse::Reloaded
        ));
        assert_eq!(
            h.service.state().decision_settings().auto_response,
            AutoResponse::AlwaysDeny
        );
    }
}
