use decision_engine::fields::{bool_or, int_or, optional_str, reject_unknown, Fields};
use rootgate_core::{Decision, DelegationTarget, RequestError};

const LOG_FIELDS: &[&str] = &[
    "action", "from.uid", "to.uid", "pid", "policy", "command", "notify", "target", "context",
    "gids",
];

const NOTIFY_FIELDS: &[&str] = &["action", "from.uid", "pid", "policy"];

/// Decision the daemon made on its own and reports after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReport {
    pub from_uid: i32,
    pub to_uid: i32,
    pub pid: i32,
    pub decision: Decision,
    pub command: String,
    pub notify: Option<bool>,
    pub target: DelegationTarget,
    pub security_context: String,
    pub supplementary_groups: Vec<u32>,
}

impl LogReport {
    pub fn from_fields(fields: &Fields) -> Result<Self, RequestError> {
        reject_unknown(fields, LOG_FIELDS)?;
        Ok(Self {
            from_uid: int_or(fields, "from.uid", -1),
            to_uid: int_or(fields, "to.uid", -1),
            pid: int_or(fields, "pid", -1),
            decision: report_decision(fields),
            command: optional_str(fields, "command").unwrap_or_default(),
            notify: fields.contains_key("notify").then(|| bool_or(fields, "notify", true)),
            target: DelegationTarget::from_raw(int_or(fields, "target", -1)),
            security_context: optional_str(fields, "context").unwrap_or_default(),
            supplementary_groups: parse_groups(fields.get("gids").map(String::as_str).unwrap_or("")),
        })
    }
}

/// Notification-only report, for decisions that are not logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyReport {
    pub from_uid: i32,
    pub pid: i32,
    pub decision: Decision,
}

impl NotifyReport {
    pub fn from_fields(fields: &Fields) -> Result<Self, RequestError> {
        reject_unknown(fields, NOTIFY_FIELDS)?;
        Ok(Self {
            from_uid: int_or(fields, "from.uid", -1),
            pid: int_or(fields, "pid", -1),
            decision: report_decision(fields),
        })
    }
}

fn report_decision(fields: &Fields) -> Decision {
    Decision::from_code(int_or(fields, "policy", Decision::Allow.code())).unwrap_or(Decision::Allow)
}

/// Parses a comma-separated gid list, skipping entries that are not numbers.
pub fn parse_groups(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|gid| gid.trim().parse().ok())
        .collect()
}
