use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::policy::Decision;

/// Application identity resolved for a requesting uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub uid: i32,
    pub package_name: String,
    pub display_name: String,
    /// Set when several packages share the uid and none could be singled out.
    pub shared: bool,
}

impl PackageIdentity {
    pub fn package(uid: i32, package_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid,
            package_name: package_name.into(),
            display_name: display_name.into(),
            shared: false,
        }
    }

    /// Synthesized identity used when no single package owns the uid.
    pub fn shared_uid(uid: i32, shared_name: Option<&str>) -> Self {
        let name = match shared_name {
            Some(name) => format!("[SharedUID] {name}"),
            None => format!("[SharedUID] {uid}"),
        };
        Self {
            uid,
            package_name: name.clone(),
            display_name: name,
            shared: true,
        }
    }
}

/// Identity a root shell is delegated to, when the daemon reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationTarget {
    None,
    Pid(i32),
}

impl DelegationTarget {
    /// The daemon sends `-1` (or nothing) for "no target".
    pub fn from_raw(raw: i32) -> Self {
        if raw > 0 {
            DelegationTarget::Pid(raw)
        } else {
            DelegationTarget::None
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub from_uid: i32,
    pub to_uid: i32,
    pub from_pid: i32,
    pub package_name: String,
    pub display_name: String,
    pub command: String,
    pub decision: Decision,
    pub target: DelegationTarget,
    pub security_context: String,
    pub supplementary_groups: Vec<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AuditLogEntry {
    pub fn is_older_than(&self, cutoff: OffsetDateTime) -> bool {
        self.timestamp < cutoff
    }
}
