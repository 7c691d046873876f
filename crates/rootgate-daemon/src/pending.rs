use std::collections::HashMap;
use std::sync::Mutex;

use time::OffsetDateTime;
use tracing::debug;

use decision_engine::PendingDecision;
use rootgate_core::{PendingSummary, RequestId};

struct Entry {
    summary: PendingSummary,
    decision: PendingDecision,
}

/// Interactive requests waiting for the confirmation UI.
#[derive(Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<RequestId, Entry>>,
}

impl PendingRegistry {
    pub fn insert(&self, decision: PendingDecision) -> RequestId {
        let id = RequestId::new();
        let summary = PendingSummary {
            id,
            uid: decision.uid(),
            pid: decision.pid(),
            package_name: decision.identity().package_name.clone(),
            display_name: decision.identity().display_name.clone(),
            command: decision.command().map(str::to_string),
            received_at: OffsetDateTime::now_utc(),
        };
        self.lock().insert(id, Entry { summary, decision });
        id
    }

    /// Requests still waiting, oldest first. Requests whose requester has
    /// gone away are dropped on the way.
    pub fn list(&self) -> Vec<PendingSummary> {
        let mut entries = self.lock();
        Self::retain_answerable(&mut entries);
        let mut summaries: Vec<PendingSummary> =
            entries.values().map(|entry| entry.summary.clone()).collect();
        summaries.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        summaries
    }

    /// Removes and returns the request, so it can be answered only once.
    pub fn take(&self, id: &RequestId) -> Option<PendingDecision> {
        self.lock().remove(id).map(|entry| entry.decision)
    }

    /// Drops requests that can no longer be answered; returns how many.
    pub fn prune_abandoned(&self) -> usize {
        Self::retain_answerable(&mut self.lock())
    }

    fn retain_answerable(entries: &mut HashMap<RequestId, Entry>) -> usize {
        let before = entries.len();
        entries.retain(|id, entry| {
            let alive = entry.decision.is_answerable();
            if !alive {
                debug!(%id, uid = entry.summary.uid, "dropping abandoned request");
            }
            alive
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
