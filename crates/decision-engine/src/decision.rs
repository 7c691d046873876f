use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use policy_store::PolicyStore;
use rootgate_core::{now_unix, Decision, Expiry, PackageIdentity, PolicyRecord, RequestError};

use crate::request::PendingRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Validated,
    Aborted,
    SelfBlocked,
    AutoResolved,
    NeedsInteraction,
    Resolved,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RequestState::Received => "received",
            RequestState::Validated => "validated",
            RequestState::Aborted => "aborted",
            RequestState::SelfBlocked => "self_blocked",
            RequestState::AutoResolved => "auto_resolved",
            RequestState::NeedsInteraction => "needs_interaction",
            RequestState::Resolved => "resolved",
        };
        write!(f, "{value}")
    }
}

/// Result of [`DecisionEngine::start`](crate::DecisionEngine::start).
#[derive(Debug)]
pub enum StartOutcome {
    /// Request was invalid or its channel unusable; nothing was written.
    Aborted(RequestError),
    /// Requester could not be identified; a deny was sent.
    Denied(RequestError),
    /// Requester claimed to be the manager itself; nothing was written.
    SelfBlocked(RequestError),
    /// Global auto-response settled the request.
    AutoResolved(Decision),
    /// The confirmation UI has to call [`PendingDecision::respond`].
    NeedsInteraction(PendingDecision),
}

impl StartOutcome {
    pub fn state(&self) -> RequestState {
        match self {
            StartOutcome::Aborted(_) | StartOutcome::Denied(_) => RequestState::Aborted,
            StartOutcome::SelfBlocked(_) => RequestState::SelfBlocked,
            StartOutcome::AutoResolved(_) => RequestState::AutoResolved,
            StartOutcome::NeedsInteraction(_) => RequestState::NeedsInteraction,
        }
    }
}

/// A resolved request waiting for a decision. Consumed by `respond`, so each
/// request is answered at most once.
pub struct PendingDecision {
    request: PendingRequest,
    identity: PackageIdentity,
    base: PolicyRecord,
    restrict: bool,
    store: Arc<dyn PolicyStore>,
}

impl PendingDecision {
    pub(crate) fn new(
        request: PendingRequest,
        identity: PackageIdentity,
        base: PolicyRecord,
        restrict: bool,
        store: Arc<dyn PolicyStore>,
    ) -> Self {
        Self {
            request,
            identity,
            base,
            restrict,
            store,
        }
    }

    pub fn uid(&self) -> i32 {
        self.request.uid
    }

    pub fn pid(&self) -> i32 {
        self.request.pid
    }

    pub fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    pub fn command(&self) -> Option<&str> {
        self.request.command.as_deref()
    }

    /// Record previously stored for this uid, or the defaults for a new one.
    pub fn current_policy(&self) -> &PolicyRecord {
        &self.base
    }

    /// False once the requester can no longer receive an answer.
    pub fn is_answerable(&self) -> bool {
        self.request.channel.is_writable()
    }

    /// Sends `decision` to the requester and remembers it when `minutes` is
    /// not negative. Returns the decision actually sent, which is `Restrict`
    /// instead of `Allow` under restrict mode. Delivery and storage failures
    /// are logged, never returned.
    pub async fn respond(self, decision: Decision, minutes: i64) -> Decision {
        let sent = decision.restricted_if(self.restrict);
        let expiry = Expiry::from_duration_minutes(minutes, now_unix());
        let uid = self.request.uid;

        if let Err(err) = self.request.channel.write_decision(sent).await {
            warn!(uid, decision = %sent, error = %err, "response not delivered");
        }

        if expiry.is_persistent() {
            let record = PolicyRecord {
                decision: sent,
                expiry,
                ..self.base
            };
            if let Err(err) = self.store.upsert(&record).await {
                warn!(uid, error = %err, "failed to store policy");
            }
        }

        info!(
            uid,
            package = %self.identity.package_name,
            decision = %sent,
            expiry = %expiry,
            state = %RequestState::Resolved,
            "superuser request resolved"
        );
        sent
    }
}

impl fmt::Debug for PendingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingDecision")
            .field("request", &self.request)
            .field("identity", &self.identity)
            .field("base", &self.base)
            .field("restrict", &self.restrict)
            .finish()
    }
}
