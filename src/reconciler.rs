//! K-line reconciliator R (spec §4.7).
//!
//! Runs once, right after oper-up. Diffs the server's live `STATS g`/`STATS
//! k` masks against the store's active k-lines and records a removal
//! (source and oper left null — it's the server's doing, not an oper's)
//! for anything the store still thinks is active but the server doesn't
//! hold anymore. Deliberately asymmetric: a mask the server holds that the
//! store doesn't know about is never inserted here (spec §4.7 — "adding
//! unknown klines is deliberately deferred").

use crate::db::{Database, StoreError};
use crate::irc::{IrcHandle, SessionError};
use chrono::Utc;
use slirc_proto::{Command, Response};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

const STATS_TIMEOUT: Duration = Duration::from_secs(15);

/// Run one reconciliation pass. Silently does nothing if the server
/// denies `STATS g`/`STATS k` to this oper (spec §7: PermissionDenied
/// degrades gracefully).
pub async fn reconcile(irc: &IrcHandle, db: &Database) -> Result<(), StoreError> {
    let live_masks = match fetch_live_masks(irc).await {
        Ok(masks) => masks,
        Err(SessionError::TimedOut(label)) => {
            warn!(label, "STATS g/k timed out, skipping reconciliation");
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, "STATS g/k failed, skipping reconciliation");
            return Ok(());
        }
    };

    let Some(live_masks) = live_masks else {
        info!("server denied STATS g/k privilege, skipping reconciliation");
        return Ok(());
    };

    let active = db.klines().list_active().await?;
    let ts = Utc::now();
    let mut removed = 0;

    for (mask, id) in active {
        if !live_masks.contains(&mask) {
            db.klines().remove(id, None, None, ts).await?;
            removed += 1;
        }
    }

    info!(removed, "k-line reconciliation complete");
    Ok(())
}

/// `Ok(None)` means the server denied the privilege (`ERR_NOPRIVS`).
async fn fetch_live_masks(irc: &IrcHandle) -> Result<Option<HashSet<String>>, SessionError> {
    irc.send(Command::STATS(Some("g".to_string()), None))?;
    irc.send(Command::STATS(Some("k".to_string()), None))?;

    let mut masks = HashSet::new();
    let mut ends_seen = 0;

    loop {
        let message = irc
            .wait_for("stats g/k", STATS_TIMEOUT, |m| {
                matches!(&m.command, Command::Response(r, _)
                    if *r == Response::RPL_STATSKLINE
                        || *r == Response::RPL_ENDOFSTATS
                        || *r == Response::ERR_NOPRIVS)
            })
            .await?;

        match &message.command {
            Command::Response(r, _) if *r == Response::ERR_NOPRIVS => return Ok(None),
            Command::Response(r, params) if *r == Response::RPL_STATSKLINE => {
                if let (Some(host), Some(user)) = (params.get(2), params.get(4)) {
                    masks.insert(format!("{user}@{host}"));
                }
            }
            Command::Response(r, _) if *r == Response::RPL_ENDOFSTATS => {
                ends_seen += 1;
                if ends_seen >= 2 {
                    break;
                }
            }
            _ => {}
        }
    }

    Ok(Some(masks))
}
