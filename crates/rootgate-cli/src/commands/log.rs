use anyhow::Result;

use audit::json::render_json;
use audit::timeline::timeline;
use audit::AuditLog;

use super::{runtime, Session};

#[derive(Debug)]
pub enum LogAction {
    Show { limit: Option<usize>, json: bool },
    Prune,
    Clear,
}

pub fn execute(session: &Session, action: LogAction) -> Result<()> {
    let log = session.audit_log();
    let rt = runtime()?;
    match action {
        LogAction::Show { limit, json } => {
            let mut entries = rt.block_on(log.entries())?;
            if let Some(limit) = limit {
                entries.truncate(limit);
            }
            if json {
                println!("{}", render_json(&entries)?);
            } else if entries.is_empty() {
                println!("Audit log is empty.");
            } else {
                for line in timeline(&entries) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        LogAction::Prune => {
            let days = session.config.audit.retention_days;
            let removed = rt.block_on(log.prune(time::Duration::days(i64::from(days))))?;
            println!("Removed {removed} entries older than {days} days.");
            Ok(())
        }
        LogAction::Clear => {
            rt.block_on(log.clear())?;
            println!("Audit log cleared.");
            Ok(())
        }
    }
}
