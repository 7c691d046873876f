//! Persistent per-uid superuser policies.
//!
//! The database lives in a location only the privileged helper can reach, so
//! every operation is rendered to a SQL string, executed through a
//! [`CommandChannel`] and the line-oriented output parsed back. Each call is a
//! single backend invocation; nothing here spans a transaction.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use rootgate_core::{now_unix, PolicyRecord, USER_OFFSET};

pub mod channel;
pub mod error;
pub mod rows;
pub mod statement;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use channel::{CommandChannel, ShellChannel};
pub use error::StoreError;
pub use statement::{SqlValue, Statement};

pub const POLICY_TABLE: &str = "policies";

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn fetch(&self, uid: i32) -> Result<Option<PolicyRecord>, StoreError>;

    /// Records belonging to one user profile.
    async fn fetch_all(&self, user_id: i32) -> Result<Vec<PolicyRecord>, StoreError>;

    /// Replaces any record stored for `record.uid`.
    async fn upsert(&self, record: &PolicyRecord) -> Result<(), StoreError>;

    async fn delete(&self, uid: i32) -> Result<(), StoreError>;

    /// Removes records whose deadline passed and one-shot leftovers.
    async fn delete_expired(&self) -> Result<(), StoreError>;

    async fn set_logging(&self, uid: i32, enabled: bool) -> Result<(), StoreError>;

    async fn set_notification(&self, uid: i32, enabled: bool) -> Result<(), StoreError>;
}

/// [`PolicyStore`] backed by the privileged command channel.
#[derive(Clone)]
pub struct CommandPolicyStore {
    channel: Arc<dyn CommandChannel>,
}

impl CommandPolicyStore {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    async fn execute(&self, statement: Statement) -> Result<Vec<String>, StoreError> {
        let sql = statement.render()?;
        self.channel.sql(&sql).await
    }

    async fn query(&self, statement: Statement) -> Result<Vec<PolicyRecord>, StoreError> {
        let lines = self.execute(statement).await?;
        let rows = rows::parse_rows(&lines);
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match rows::policy_from_row(row) {
                Some(record) => records.push(record),
                None => warn!(?row, "skipping unreadable policy row"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl PolicyStore for CommandPolicyStore {
    async fn fetch(&self, uid: i32) -> Result<Option<PolicyRecord>, StoreError> {
        let records = self
            .query(Statement::new("SELECT * FROM policies WHERE uid=? LIMIT 1").bind(uid))
            .await?;
        Ok(records.into_iter().next())
    }

    async fn fetch_all(&self, user_id: i32) -> Result<Vec<PolicyRecord>, StoreError> {
        self.query(
            Statement::new("SELECT * FROM policies WHERE uid/?=? ORDER BY uid")
                .bind(USER_OFFSET)
                .bind(user_id),
        )
        .await
    }

    async fn upsert(&self, record: &PolicyRecord) -> Result<(), StoreError> {
        debug!(uid = record.uid, decision = %record.decision, expiry = %record.expiry, "storing policy");
        self.execute(
            Statement::new(
                "REPLACE INTO policies (uid,policy,until,logging,notification) VALUES(?,?,?,?,?)",
            )
            .bind(record.uid)
            .bind(record.decision.code())
            .bind(record.expiry.to_raw())
            .bind(record.logging)
            .bind(record.notification),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, uid: i32) -> Result<(), StoreError> {
        debug!(uid, "deleting policy");
        self.execute(Statement::new("DELETE FROM policies WHERE uid=?").bind(uid))
            .await?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<(), StoreError> {
        self.execute(
            Statement::new("DELETE FROM policies WHERE (until > 0 AND until < ?) OR until < 0")
                .bind(now_unix()),
        )
        .await?;
        Ok(())
    }

    async fn set_logging(&self, uid: i32, enabled: bool) -> Result<(), StoreError> {
        self.execute(
            Statement::new("UPDATE policies SET logging=? WHERE uid=?")
                .bind(enabled)
                .bind(uid),
        )
        .await?;
        Ok(())
    }

    async fn set_notification(&self, uid: i32, enabled: bool) -> Result<(), StoreError> {
        self.execute(
            Statement::new("UPDATE policies SET notification=? WHERE uid=?")
                .bind(enabled)
                .bind(uid),
        )
        .await?;
        Ok(())
    }
}
