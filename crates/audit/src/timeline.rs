use time::format_description::well_known::Rfc3339;

use rootgate_core::{AuditLogEntry, DelegationTarget};

/// One human-readable line per entry, in the order given.
pub fn timeline(entries: &[AuditLogEntry]) -> Vec<String> {
    entries.iter().map(line).collect()
}

fn line(entry: &AuditLogEntry) -> String {
    let when = entry
        .timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| entry.timestamp.unix_timestamp().to_string());
    let command = if entry.command.is_empty() {
        "<shell>"
    } else {
        entry.command.as_str()
    };
    let mut line = format!(
        "{when} {decision:<8} {name} (uid {from} pid {pid} -> {to}) {command}",
        decision = entry.decision,
        name = entry.display_name,
        from = entry.from_uid,
        pid = entry.from_pid,
        to = entry.to_uid,
    );
    if let DelegationTarget::Pid(target) = entry.target {
        line.push_str(&format!(" [target {target}]"));
    }
    line
}

#[cfg(test)]
mod tests {
    use rootgate_core::Decision;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn renders_entry_line() {
        let entry = AuditLogEntry {
            from_uid: 10_050,
            to_uid: 0,
            from_pid: 1234,
            package_name: "com.example.terminal".to_string(),
            display_name: "Terminal".to_string(),
            command: String::new(),
            decision: Decision::Deny,
            target: DelegationTarget::Pid(812),
            security_context: String::new(),
            supplementary_groups: Vec::new(),
            timestamp: datetime!(2024-05-01 12:00:00 UTC),
        };
        let lines = timeline(&[entry]);
        assert_eq!(
            lines,
            vec!["2024-05-01T12:00:00Z deny     Terminal (uid 10050 pid 1234 -> 0) <shell> [target 812]"]
        );
    }
}
