use std::sync::Arc;

use tracing::{debug, warn};

use policy_store::{CommandChannel, PolicyStore};
use rootgate_core::config::SuperuserConfig;
use rootgate_core::{AutoResponse, Decision, DecisionSettings, PolicyRecord, RequestError};

mod decision;
pub mod fields;
pub mod identity;
pub mod request;
pub mod response;

pub use decision::{PendingDecision, RequestState, StartOutcome};
pub use identity::{IdentityError, IdentityResolver, PackageEntry, PackageRegistry, RegistryResolver};
pub use request::{PendingRequest, RequestFields};
pub use response::{reply_channel, FifoChannel, ReplyChannel, ResponseChannel};

/// Static engine options, taken from the `[superuser]` config section.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Our own package. Requests claiming it are treated as spoofing.
    pub manager_package: String,
    pub default_logging: bool,
    pub default_notification: bool,
}

impl From<&SuperuserConfig> for EngineOptions {
    fn from(config: &SuperuserConfig) -> Self {
        Self {
            manager_package: config.manager_package.clone(),
            default_logging: config.default_logging,
            default_notification: config.default_notification,
        }
    }
}

/// Decides superuser requests.
///
/// Holds no per-request state, so one engine serves any number of concurrent
/// requests. Concurrent decisions for the same uid are not serialized here;
/// the last write to the policy store wins.
pub struct DecisionEngine {
    store: Arc<dyn PolicyStore>,
    resolver: Arc<dyn IdentityResolver>,
    commands: Arc<dyn CommandChannel>,
    options: EngineOptions,
}

impl DecisionEngine {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        resolver: Arc<dyn IdentityResolver>,
        commands: Arc<dyn CommandChannel>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            resolver,
            commands,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    /// Runs a request up to the point where a decision is needed. With
    /// auto-response configured the decision is made, sent and stored here;
    /// otherwise the returned [`PendingDecision`] goes to the confirmation UI.
    pub async fn start(&self, request: PendingRequest, settings: DecisionSettings) -> StartOutcome {
        let uid = request.uid;
        let pid = request.pid;
        debug!(uid, pid, state = %RequestState::Received, "superuser request");

        if let Err(err) = request.validate() {
            warn!(uid, pid, error = %err, state = %RequestState::Aborted, "rejecting request");
            return StartOutcome::Aborted(err);
        }
        debug!(uid, pid, state = %RequestState::Validated, "request validated");

        let identity = match identity::resolve_blocking(&self.resolver, uid, pid).await {
            Ok(identity) => identity,
            Err(err) => {
                let err = RequestError::UnresolvedIdentity {
                    uid,
                    reason: err.to_string(),
                };
                warn!(uid, pid, error = %err, "denying unidentifiable requester");
                if let Err(write_err) = request.channel.write_decision(Decision::Deny).await {
                    warn!(uid, error = %write_err, "deny not delivered");
                }
                return StartOutcome::Denied(err);
            }
        };

        if identity.package_name == self.options.manager_package {
            let err = RequestError::SecurityViolation(format!(
                "uid {uid} pid {pid} resolved to the manager package {}",
                identity.package_name
            ));
            warn!(uid, pid, error = %err, state = %RequestState::SelfBlocked, "blocking spoofed manager");
            self.uninstall(&identity.package_name);
            return StartOutcome::SelfBlocked(err);
        }

        let base = match self.store.fetch(uid).await {
            Ok(Some(record)) => record,
            Ok(None) => self.default_record(uid),
            Err(err) => {
                warn!(uid, error = %err, "policy lookup failed, using defaults");
                self.default_record(uid)
            }
        };

        let pending = PendingDecision::new(request, identity, base, settings.restrict, self.store.clone());
        match settings.auto_response {
            AutoResponse::AlwaysDeny => {
                debug!(uid, state = %RequestState::AutoResolved, "auto-denying");
                StartOutcome::AutoResolved(pending.respond(Decision::Deny, 0).await)
            }
            AutoResponse::AlwaysAllow => {
                debug!(uid, state = %RequestState::AutoResolved, "auto-allowing");
                StartOutcome::AutoResolved(pending.respond(Decision::Allow, 0).await)
            }
            AutoResponse::Ask => {
                debug!(uid, state = %RequestState::NeedsInteraction, "awaiting confirmation");
                StartOutcome::NeedsInteraction(pending)
            }
        }
    }

    fn default_record(&self, uid: i32) -> PolicyRecord {
        PolicyRecord::new(uid, self.options.default_logging, self.options.default_notification)
    }

    /// Fires off removal of `package` without waiting for it.
    fn uninstall(&self, package: &str) {
        let commands = self.commands.clone();
        let command = format!("pm uninstall {} >/dev/null 2>&1", shell_quote(package));
        tokio::spawn(async move {
            if let Err(err) = commands.shell(&command).await {
                warn!(error = %err, "uninstall of spoofed manager failed");
            }
        });
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
