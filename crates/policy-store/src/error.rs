use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to launch privileged helper: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("privileged helper exited with {status}: {stderr}")]
    Helper { status: String, stderr: String },
    #[error("statement has {placeholders} placeholders but {bound} values were bound")]
    Binding { placeholders: usize, bound: usize },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("background task failed: {0}")]
    Join(String),
}
