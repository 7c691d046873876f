use std::process::{Command, Stdio};

use async_trait::async_trait;
use tracing::debug;

use rootgate_core::config::ChannelConfig;

use crate::error::StoreError;

/// Privileged command-execution channel. This is the only path to the
/// policy database and to package management.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Runs one SQL statement through the helper and returns its output lines.
    async fn sql(&self, statement: &str) -> Result<Vec<String>, StoreError>;

    /// Runs a shell command with elevated privileges.
    async fn shell(&self, command: &str) -> Result<Vec<String>, StoreError>;
}

/// Channel that shells out to the configured helper binaries. Every call runs
/// on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct ShellChannel {
    helper: String,
    helper_args: Vec<String>,
    shell: String,
}

impl ShellChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            helper: config.helper.clone(),
            helper_args: config.helper_args.clone(),
            shell: config.shell.clone(),
        }
    }

    async fn run(&self, program: String, args: Vec<String>) -> Result<Vec<String>, StoreError> {
        tokio::task::spawn_blocking(move || run_blocking(&program, &args))
            .await
            .map_err(|err| StoreError::Join(err.to_string()))?
    }
}

#[async_trait]
impl CommandChannel for ShellChannel {
    async fn sql(&self, statement: &str) -> Result<Vec<String>, StoreError> {
        debug!(statement, "executing statement");
        let mut args = self.helper_args.clone();
        args.push(statement.to_string());
        self.run(self.helper.clone(), args).await
    }

    async fn shell(&self, command: &str) -> Result<Vec<String>, StoreError> {
        debug!(command, "executing privileged shell command");
        self.run(self.shell.clone(), vec!["-c".to_string(), command.to_string()])
            .await
    }
}

fn run_blocking(program: &str, args: &[String]) -> Result<Vec<String>, StoreError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()?;
    if !output.status.success() {
        return Err(StoreError::Helper {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(helper: &str, helper_args: &[&str]) -> ShellChannel {
        ShellChannel::new(&ChannelConfig {
            helper: helper.to_string(),
            helper_args: helper_args.iter().map(|arg| arg.to_string()).collect(),
            shell: "sh".to_string(),
        })
    }

    #[tokio::test]
    async fn statement_is_passed_as_last_argument() {
        let channel = channel("echo", &["uid=1|policy=2"]);
        let lines = channel.sql("until=0").await.unwrap();
        assert_eq!(lines, vec!["uid=1|policy=2 until=0".to_string()]);
    }

    #[tokio::test]
    async fn shell_commands_capture_lines() {
        let channel = channel("true", &[]);
        let lines = channel.shell("echo one; echo two").await.unwrap();
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn failing_helper_is_an_error() {
        let channel = channel("false", &[]);
        let result = channel.sql("SELECT 1").await;
        assert!(matches!(result, Err(StoreError::Helper { .. })));
    }

    #[tokio::test]
    async fn missing_helper_is_a_spawn_error() {
        let channel = channel("/nonexistent/rootgate-helper", &[]);
        let result = channel.sql("SELECT 1").await;
        assert!(matches!(result, Err(StoreError::Spawn(_))));
    }
}
