use anyhow::{Context, Result};

use decision_engine::{IdentityError, IdentityResolver};
use policy_store::PolicyStore;
use rootgate_core::{now_unix, Expiry, PackageIdentity, PolicyRecord};

use super::{runtime, Session};

#[derive(Debug)]
pub enum PolicyAction {
    List { user: i32 },
    Revoke { uid: i32 },
    Logging { uid: i32, enabled: bool },
    Notify { uid: i32, enabled: bool },
    Cleanup,
}

pub fn execute(session: &Session, action: PolicyAction) -> Result<()> {
    let store = session.store();
    let rt = runtime()?;
    match action {
        PolicyAction::List { user } => {
            let resolver = session.resolver();
            let listing = rt.block_on(list(store.as_ref(), &resolver, user))?;
            for uid in &listing.removed {
                println!("Removed policy for uid {uid}: package no longer installed.");
            }
            if listing.entries.is_empty() {
                println!("No stored policies for user {user}.");
            }
            let now = now_unix();
            for (record, identity) in &listing.entries {
                println!("{}", render_row(record, identity, now));
            }
            Ok(())
        }
        PolicyAction::Revoke { uid } => {
            rt.block_on(store.delete(uid))?;
            println!("Revoked policy for uid {uid}.");
            Ok(())
        }
        PolicyAction::Logging { uid, enabled } => {
            rt.block_on(store.set_logging(uid, enabled))?;
            println!("Logging {} for uid {uid}.", on_off(enabled));
            Ok(())
        }
        PolicyAction::Notify { uid, enabled } => {
            rt.block_on(store.set_notification(uid, enabled))?;
            println!("Notifications {} for uid {uid}.", on_off(enabled));
            Ok(())
        }
        PolicyAction::Cleanup => {
            rt.block_on(store.delete_expired())?;
            println!("Expired policies removed.");
            Ok(())
        }
    }
}

pub struct Listing {
    pub entries: Vec<(PolicyRecord, PackageIdentity)>,
    /// Uids whose package is gone; their records were deleted.
    pub removed: Vec<i32>,
}

/// Stored policies for `user`, with records that no longer resolve to an
/// installed package deleted along the way.
pub async fn list(store: &dyn PolicyStore, resolver: &dyn IdentityResolver, user: i32) -> Result<Listing> {
    let mut listing = Listing {
        entries: Vec::new(),
        removed: Vec::new(),
    };
    for record in store.fetch_all(user).await? {
        match resolver.resolve(record.uid, -1) {
            Ok(identity) => listing.entries.push((record, identity)),
            Err(IdentityError::UnknownUid(uid)) => {
                store.delete(uid).await?;
                listing.removed.push(uid);
            }
            Err(err) => return Err(err).context("resolve stored policies"),
        }
    }
    Ok(listing)
}

fn render_row(record: &PolicyRecord, identity: &PackageIdentity, now: i64) -> String {
    let expiry = match record.expiry {
        Expiry::Forever => "forever".to_string(),
        Expiry::Once => "once".to_string(),
        Expiry::Until(_) if record.is_expired(now) => "expired".to_string(),
        Expiry::Until(_) => {
            let seconds = record.expiry.remaining(now).unwrap_or(0);
            format!("{}m left", (seconds + 59) / 60)
        }
    };
    format!(
        "{uid:>8}  {decision:<8}  {expiry:<10}  log:{log:<3}  notify:{notify:<3}  {name} ({package})",
        uid = record.uid,
        decision = record.decision,
        log = on_off(record.logging),
        notify = on_off(record.notification),
        name = identity.display_name,
        package = identity.package_name,
    )
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
