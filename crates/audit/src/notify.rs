use std::sync::Mutex;

use tracing::info;

use rootgate_core::{Decision, PackageIdentity};

/// Shows a transient acknowledgment for a decision. Called without awaiting;
/// implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, identity: &PackageIdentity, decision: Decision);
}

/// Emits the acknowledgment as a log event for whatever UI tails the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, identity: &PackageIdentity, decision: Decision) {
        let verb = if decision.is_granted() {
            "granted"
        } else {
            "denied"
        };
        info!(
            uid = identity.uid,
            package = %identity.package_name,
            decision = %decision,
            "{} was {verb} superuser rights",
            identity.display_name
        );
    }
}

/// Keeps every acknowledgment in memory until taken.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    seen: Mutex<Vec<(PackageIdentity, Decision)>>,
}

impl MemoryNotifier {
    pub fn take(&self) -> Vec<(PackageIdentity, Decision)> {
        match self.seen.lock() {
            Ok(mut seen) => std::mem::take(&mut *seen),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, identity: &PackageIdentity, decision: Decision) {
        let mut seen = match self.seen.lock() {
            Ok(seen) => seen,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.push((identity.clone(), decision));
    }
}
