pub mod config;
pub mod error;
pub mod ids;
pub mod ipc;
pub mod policy;
pub mod types;

pub use config::{AutoResponse, Config, ConfigPaths, DecisionSettings, NotificationMode};
pub use error::RequestError;
pub use ids::RequestId;
pub use ipc::{ControlRequest, ControlResponse, PendingSummary, RespondPayload, StatusPayload};
pub use policy::{app_id, user_id, Decision, Expiry, PolicyRecord, USER_OFFSET};
pub use types::{AuditLogEntry, DelegationTarget, PackageIdentity};

/// Current wall clock as unix seconds.
pub fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
