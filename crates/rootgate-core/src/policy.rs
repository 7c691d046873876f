use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Uid range reserved per user profile.
pub const USER_OFFSET: i32 = 100_000;

pub fn user_id(uid: i32) -> i32 {
    uid / USER_OFFSET
}

pub fn app_id(uid: i32) -> i32 {
    uid % USER_OFFSET
}

/// Outcome of a superuser request. The discriminants are the wire codes
/// written back to the daemon, so the order must never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum Decision {
    Query = 0,
    Deny = 1,
    Allow = 2,
    Restrict = 3,
}

impl Decision {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Decision::Query),
            1 => Some(Decision::Deny),
            2 => Some(Decision::Allow),
            3 => Some(Decision::Restrict),
            _ => None,
        }
    }

    /// Whether the requester ends up with root, constrained or not.
    pub fn is_granted(self) -> bool {
        matches!(self, Decision::Allow | Decision::Restrict)
    }

    /// Applies the global restrict mode. Only `Allow` is affected.
    pub fn restricted_if(self, restrict: bool) -> Self {
        match self {
            Decision::Allow if restrict => Decision::Restrict,
            other => other,
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "query" | "ask" => Ok(Decision::Query),
            "deny" => Ok(Decision::Deny),
            "allow" | "grant" => Ok(Decision::Allow),
            "restrict" => Ok(Decision::Restrict),
            _ => Err(format!("unknown decision: {value}")),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Decision::Query => "query",
            Decision::Deny => "deny",
            Decision::Allow => "allow",
            Decision::Restrict => "restrict",
        };
        f.pad(value)
    }
}

/// When a stored decision stops being honored.
///
/// The backend stores this as a single integer: `0` for forever, a positive
/// unix timestamp for a deadline, and any negative value for a one-shot
/// decision. One-shot decisions are never written by us; rows carrying one
/// are treated as already expired.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    Forever,
    Once,
    Until(i64),
}

impl Expiry {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => Expiry::Forever,
            value if value > 0 => Expiry::Until(value),
            _ => Expiry::Once,
        }
    }

    pub fn to_raw(self) -> i64 {
        match self {
            Expiry::Forever => 0,
            Expiry::Once => -1,
            Expiry::Until(at) => at,
        }
    }

    /// Maps a duration picked by the user onto an expiry. Positive minutes are
    /// a relative TTL from `now`, zero means remember forever and negative
    /// values mean this request only.
    pub fn from_duration_minutes(minutes: i64, now: i64) -> Self {
        match minutes {
            0 => Expiry::Forever,
            m if m > 0 => Expiry::Until(now.saturating_add(m.saturating_mul(60))),
            _ => Expiry::Once,
        }
    }

    /// Whether a decision with this expiry may be written to the store.
    pub fn is_persistent(self) -> bool {
        !matches!(self, Expiry::Once)
    }

    pub fn is_expired(self, now: i64) -> bool {
        match self {
            Expiry::Forever => false,
            Expiry::Once => true,
            Expiry::Until(at) => at < now,
        }
    }

    /// Seconds left before expiry, `None` when the record never expires.
    pub fn remaining(self, now: i64) -> Option<i64> {
        match self {
            Expiry::Forever => None,
            Expiry::Once => Some(0),
            Expiry::Until(at) => Some((at - now).max(0)),
        }
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiry::Forever => write!(f, "forever"),
            Expiry::Once => write!(f, "once"),
            Expiry::Until(at) => write!(f, "until {at}"),
        }
    }
}

/// Persisted decision for one requesting uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub uid: i32,
    pub decision: Decision,
    pub expiry: Expiry,
    pub logging: bool,
    pub notification: bool,
}

impl PolicyRecord {
    pub fn new(uid: i32, logging: bool, notification: bool) -> Self {
        Self {
            uid,
            decision: Decision::Query,
            expiry: Expiry::Forever,
            logging,
            notification,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_codes_are_stable() {
        assert_eq!(Decision::Query.code(), 0);
        assert_eq!(Decision::Deny.code(), 1);
        assert_eq!(Decision::Allow.code(), 2);
        assert_eq!(Decision::Restrict.code(), 3);
        assert_eq!(Decision::from_code(4), None);
        assert_eq!(Decision::from_code(-1), None);
    }

    #[test]
    fn restrict_mode_only_touches_allow() {
        assert_eq!(Decision::Allow.restricted_if(true), Decision::Restrict);
        assert_eq!(Decision::Allow.restricted_if(false), Decision::Allow);
        assert_eq!(Decision::Deny.restricted_if(true), Decision::Deny);
        assert_eq!(Decision::Query.restricted_if(true), Decision::Query);
    }

    #[test]
    fn parses_decision_names() {
        assert_eq!("ALLOW".parse::<Decision>(), Ok(Decision::Allow));
        assert_eq!("deny".parse::<Decision>(), Ok(Decision::Deny));
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn raw_expiry_encoding() {
        assert_eq!(Expiry::from_raw(0), Expiry::Forever);
        assert_eq!(Expiry::from_raw(-1), Expiry::Once);
        assert_eq!(Expiry::from_raw(-30), Expiry::Once);
        assert_eq!(Expiry::from_raw(1_700_000_000), Expiry::Until(1_700_000_000));
        assert_eq!(Expiry::Forever.to_raw(), 0);
        assert!(Expiry::Once.to_raw() < 0);
    }

    #[test]
    fn durations_map_to_expiry() {
        let now = 1_000;
        assert_eq!(Expiry::from_duration_minutes(10, now), Expiry::Until(1_600));
        assert_eq!(Expiry::from_duration_minutes(0, now), Expiry::Forever);
        assert_eq!(Expiry::from_duration_minutes(-1, now), Expiry::Once);
        assert!(!Expiry::from_duration_minutes(-1, now).is_persistent());
    }

    #[test]
    fn expiry_checks() {
        assert!(!Expiry::Forever.is_expired(i64::MAX));
        assert!(Expiry::Once.is_expired(0));
        assert!(Expiry::Until(10).is_expired(11));
        assert!(!Expiry::Until(10).is_expired(10));
        assert_eq!(Expiry::Until(100).remaining(40), Some(60));
        assert_eq!(Expiry::Forever.remaining(40), None);
    }

    #[test]
    fn user_arithmetic() {
        assert_eq!(user_id(10_050), 0);
        assert_eq!(user_id(1_010_050), 10);
        assert_eq!(app_id(1_010_050), 10_050);
    }
}
