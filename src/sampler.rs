//! Minutely on-duty sampler M (spec §4.7, §9).
//!
//! Fires once per wall-clock minute. Asks the server for `STATS p`, then
//! WHOISes each on-duty nick to resolve the setter's canonical services
//! account — the oper block name from `STATS p` is often shared by
//! several people, the account isn't — and records one sample per oper
//! whose `statsp` preference isn't explicitly disabled.

use crate::db::{Database, StoreError};
use crate::irc::IrcHandle;
use crate::search::{normalise_plain, FieldKind};
use chrono::{DateTime, Timelike, Utc};
use regex::Regex;
use slirc_proto::{Command, Response};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

const STATS_TIMEOUT: Duration = Duration::from_secs(10);
const WHOIS_TIMEOUT: Duration = Duration::from_secs(10);

static RE_STATSP_OPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<nick>\S+) \((?P<user>\S+)@(?P<host>\S+)\) \{(?P<oper>\S+)\}$")
        .expect("valid stats p regex")
});

/// Truncate `now` to the current minute, per spec §9's sampling formula.
pub fn truncate_to_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(now)
}

/// Sleep until the next wall-clock minute boundary.
pub async fn sleep_until_next_minute() {
    let now = Utc::now();
    let secs_into_minute = now.second() as u64;
    let wait = Duration::from_secs((60 - secs_into_minute) % 60).max(Duration::from_millis(1));
    tokio::time::sleep(wait).await;
}

struct OnDutyOper {
    nick: String,
    user: String,
    host: String,
    oper_block: String,
}

/// Run one sampling pass for minute `ts` (already truncated by the caller).
pub async fn sample(irc: &IrcHandle, db: &Database, ts: DateTime<Utc>) -> Result<(), StoreError> {
    let opers = match fetch_statsp(irc).await {
        Ok(opers) => opers,
        Err(e) => {
            warn!(error = %e, "STATS p failed, skipping this minute's sample");
            return Ok(());
        }
    };

    for oper in opers {
        let account = resolve_account(irc, &oper.nick).await.unwrap_or(oper.oper_block.clone());
        let search_account = normalise_plain(&account, FieldKind::Nick);

        if !db.preferences().statsp_enabled(&account, &search_account).await? {
            debug!(oper = %account, "statsp sampling disabled by preference, skipping");
            continue;
        }

        let mask = format!("{}!{}@{}", oper.nick, oper.user, oper.host);
        db.statsp().insert(&account, &search_account, &mask, ts).await?;
    }

    Ok(())
}

async fn fetch_statsp(irc: &IrcHandle) -> Result<Vec<OnDutyOper>, crate::irc::SessionError> {
    irc.send(Command::STATS(Some("p".to_string()), None))?;

    let mut opers = Vec::new();
    loop {
        let message = irc
            .wait_for("stats p", STATS_TIMEOUT, |m| {
                matches!(&m.command, Command::Response(r, _)
                    if *r == Response::RPL_STATSDEBUG || *r == Response::RPL_ENDOFSTATS)
            })
            .await?;

        match &message.command {
            Command::Response(r, params) if *r == Response::RPL_STATSDEBUG => {
                if let Some(text) = params.get(2) {
                    if let Some(caps) = RE_STATSP_OPER.captures(text) {
                        opers.push(OnDutyOper {
                            nick: caps["nick"].to_string(),
                            user: caps["user"].to_string(),
                            host: caps["host"].to_string(),
                            oper_block: caps["oper"].to_string(),
                        });
                    }
                }
            }
            Command::Response(r, _) if *r == Response::RPL_ENDOFSTATS => break,
            _ => {}
        }
    }

    Ok(opers)
}

async fn resolve_account(irc: &IrcHandle, nick: &str) -> Option<String> {
    irc.send(Command::WHOIS(None, nick.to_string())).ok()?;

    let message = irc
        .wait_for("whois account", WHOIS_TIMEOUT, |m| {
            matches!(&m.command, Command::Response(r, _)
                if *r == Response::RPL_WHOISACCOUNT || *r == Response::RPL_ENDOFWHOIS)
        })
        .await
        .ok()?;

    match &message.command {
        Command::Response(r, params) if *r == Response::RPL_WHOISACCOUNT => params.get(2).cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stats_p_regex_captures_nick_user_host_oper() {
        let caps = RE_STATSP_OPER
            .captures("alice (alice@example.org) {AliceOper}")
            .expect("matches");
        assert_eq!(&caps["nick"], "alice");
        assert_eq!(&caps["user"], "alice");
        assert_eq!(&caps["host"], "example.org");
        assert_eq!(&caps["oper"], "AliceOper");
    }

    #[test]
    fn truncate_to_minute_zeroes_seconds_and_nanos() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 34, 56).unwrap();
        let truncated = truncate_to_minute(ts);
        assert_eq!(truncated.second(), 0);
        assert_eq!(truncated.minute(), 34);
    }
}
