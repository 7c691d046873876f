use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use rootgate_core::AuditLogEntry;

/// Append-only record of superuser decisions.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Entries newest first.
    async fn entries(&self) -> Result<Vec<AuditLogEntry>>;

    /// Drops entries older than `retention`, returning how many were removed.
    async fn prune(&self, retention: Duration) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}

/// Audit log stored as one JSON object per line.
pub struct JsonlAuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<AuditLogEntry>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read audit log {}", self.path.display()))
            }
        };
        let mut entries = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(line = index + 1, error = %err, "skipping corrupt audit entry"),
            }
        }
        Ok(entries)
    }

    async fn write_all(&self, entries: &[AuditLogEntry]) -> Result<()> {
        let mut contents = String::new();
        for entry in entries {
            contents.push_str(&serde_json::to_string(entry).context("render audit entry JSON")?);
            contents.push('\n');
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, contents)
            .await
            .with_context(|| format!("write audit log {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replace audit log {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create audit dir {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(entry).context("render audit entry JSON")?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open audit log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("append audit log {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<AuditLogEntry>> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    async fn prune(&self, retention: Duration) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let entries = self.read_all().await?;
        let cutoff = OffsetDateTime::now_utc() - retention;
        let before = entries.len();
        let kept: Vec<AuditLogEntry> = entries
            .into_iter()
            .filter(|entry| !entry.is_older_than(cutoff))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.write_all(&kept).await?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove audit log {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use rootgate_core::{Decision, DelegationTarget};

    use super::*;

    fn entry(uid: i32, age: Duration) -> AuditLogEntry {
        AuditLogEntry {
            from_uid: uid,
            to_uid: 0,
            from_pid: 1234,
            package_name: "com.example.terminal".to_string(),
            display_name: "Terminal".to_string(),
            command: "id".to_string(),
            decision: Decision::Allow,
            target: DelegationTarget::None,
            security_context: "u:r:untrusted_app:s0".to_string(),
            supplementary_groups: vec![3003],
            timestamp: OffsetDateTime::now_utc() - age,
        }
    }

    #[tokio::test]
    async fn appends_and_lists_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("logs").join("audit.jsonl"));
        assert!(log.entries().await.unwrap().is_empty());

        log.append(&entry(1, Duration::hours(2))).await.unwrap();
        log.append(&entry(2, Duration::minutes(1))).await.unwrap();

        let uids: Vec<i32> = log.entries().await.unwrap().iter().map(|e| e.from_uid).collect();
        assert_eq!(uids, vec![2, 1]);
    }

    #[tokio::test]
    async fn prune_removes_old_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("audit.jsonl"));
        log.append(&entry(1, Duration::days(30))).await.unwrap();
        log.append(&entry(2, Duration::days(1))).await.unwrap();

        assert_eq!(log.prune(Duration::days(14)).await.unwrap(), 1);
        let remaining = log.entries().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].from_uid, 2);
        assert_eq!(log.prune(Duration::days(14)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = JsonlAuditLog::new(&path);
        log.append(&entry(1, Duration::ZERO)).await.unwrap();
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{not json\n");
        std::fs::write(&path, contents).unwrap();

        assert_eq!(log.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("audit.jsonl"));
        log.clear().await.unwrap();
        log.append(&entry(1, Duration::ZERO)).await.unwrap();
        log.clear().await.unwrap();
        assert!(log.entries().await.unwrap().is_empty());
    }
}
