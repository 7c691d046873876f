//! In-process stand-in for the privileged helper.
//!
//! Statements run against an in-memory SQLite database with the same schema
//! the helper serves, and query results are rendered in the helper's
//! `key=value|key=value` line format so parsing is exercised end to end.

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use rootgate_core::Decision;

use crate::channel::CommandChannel;
use crate::error::StoreError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS policies \
    (uid INT, policy INT, until INT, logging INT, notification INT, PRIMARY KEY(uid))";

pub struct SqliteChannel {
    conn: Mutex<Connection>,
    shell_log: Mutex<Vec<String>>,
    pending_failure: Mutex<Option<String>>,
}

impl SqliteChannel {
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("open in-memory database");
        conn.execute_batch(SCHEMA).expect("create policy schema");
        Self {
            conn: Mutex::new(conn),
            shell_log: Mutex::new(Vec::new()),
            pending_failure: Mutex::new(None),
        }
    }

    /// Inserts a row bypassing the store, for encodings the store never writes.
    pub fn insert_raw(&self, uid: i32, decision: Decision, until: i64) {
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        conn.execute(
            "REPLACE INTO policies (uid,policy,until,logging,notification) VALUES(?1,?2,?3,1,1)",
            rusqlite::params![uid, decision.code(), until],
        )
        .expect("insert raw policy");
    }

    /// Makes the next statement or shell command fail with `message`.
    pub fn fail_next(&self, message: &str) {
        *self
            .pending_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(message.to_string());
    }

    pub fn shell_commands(&self) -> Vec<String> {
        self.shell_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn take_failure(&self) -> Result<(), StoreError> {
        let failure = self
            .pending_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match failure {
            Some(message) => Err(StoreError::Backend(message)),
            None => Ok(()),
        }
    }

    fn run(&self, statement: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let backend = |err: rusqlite::Error| StoreError::Backend(err.to_string());

        let mut prepared = conn.prepare(statement).map_err(backend)?;
        if prepared.column_count() == 0 {
            prepared.execute([]).map_err(backend)?;
            return Ok(Vec::new());
        }

        let names: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = prepared.query([]).map_err(backend)?;
        let mut lines = Vec::new();
        while let Some(row) = rows.next().map_err(backend)? {
            let mut fields = Vec::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                let value = match row.get_ref(index).map_err(backend)? {
                    ValueRef::Null => String::new(),
                    ValueRef::Integer(value) => value.to_string(),
                    ValueRef::Real(value) => value.to_string(),
                    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                        String::from_utf8_lossy(bytes).into_owned()
                    }
                };
                fields.push(format!("{name}={value}"));
            }
            lines.push(fields.join("|"));
        }
        Ok(lines)
    }
}

impl Default for SqliteChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandChannel for SqliteChannel {
    async fn sql(&self, statement: &str) -> Result<Vec<String>, StoreError> {
        self.take_failure()?;
        self.run(statement)
    }

    async fn shell(&self, command: &str) -> Result<Vec<String>, StoreError> {
        self.shell_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command.to_string());
        self.take_failure()?;
        Ok(Vec::new())
    }
}
