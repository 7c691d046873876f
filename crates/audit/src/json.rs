use anyhow::{Context, Result};

use rootgate_core::AuditLogEntry;

pub fn render_json(entries: &[AuditLogEntry]) -> Result<String> {
    serde_json::to_string_pretty(entries).context("render audit entries as JSON")
}
