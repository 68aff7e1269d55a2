//! Row types for every table in the store (spec §3).

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;

/// A k-line: a time-bounded user@host ban, possibly a glob mask.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Kline {
    pub id: i64,
    pub mask: String,
    pub search_mask: String,
    pub source: String,
    pub oper: String,
    pub duration_s: Option<i64>,
    pub reason: String,
    pub ts: DateTime<Utc>,
    pub expire: Option<DateTime<Utc>>,
    pub last_reject: Option<DateTime<Utc>>,
}

/// Marks a k-line as removed. At most one row per k-line.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KlineRemove {
    pub kline_id: i64,
    pub source: Option<String>,
    pub oper: Option<String>,
    pub ts: DateTime<Utc>,
}

/// A client killed while a k-line exit was pending for their nick.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KlineKill {
    pub id: i64,
    pub kline_id: i64,
    pub nickname: String,
    pub search_nickname: String,
    pub username: String,
    pub search_username: String,
    pub hostname: String,
    pub search_hostname: String,
    pub ip: Option<IpNetwork>,
    pub ts: DateTime<Utc>,
}

/// A rejected connection attempt matching an active k-line.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KlineReject {
    pub id: i64,
    pub kline_id: i64,
    pub nickname: String,
    pub search_nickname: String,
    pub username: String,
    pub search_username: String,
    pub hostname: String,
    pub search_hostname: String,
    pub ip: Option<IpNetwork>,
    pub ts: DateTime<Utc>,
}

/// A free-form tag attached to a k-line, either extracted from `%tag` tokens
/// in the reason or added explicitly via `ktag`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KlineTag {
    pub kline_id: i64,
    pub tag: String,
    pub search_tag: String,
    pub source: String,
    pub oper: String,
    pub ts: DateTime<Utc>,
}

/// A client connection, as reported by a `cliconn` snote.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cliconn {
    pub id: i64,
    pub nickname: String,
    pub search_nickname: String,
    pub username: String,
    pub search_username: String,
    pub realname: String,
    pub search_realname: String,
    pub hostname: String,
    pub search_hostname: String,
    pub account: Option<String>,
    pub ip: Option<IpNetwork>,
    pub server: String,
    pub ts: DateTime<Utc>,
}

/// A client disconnection, as reported by a `cliexit` snote.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cliexit {
    pub id: i64,
    pub cliconn_id: Option<i64>,
    pub nickname: String,
    pub search_nickname: String,
    pub username: String,
    pub search_username: String,
    pub hostname: String,
    pub search_hostname: String,
    pub ip: Option<IpNetwork>,
    pub reason: String,
    pub ts: DateTime<Utc>,
}

/// A nickname change observed for a still-connected client.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NickChange {
    pub cliconn_id: i64,
    pub nickname: String,
    pub search_nickname: String,
    pub ts: DateTime<Utc>,
}

/// One minute-granularity on-duty sample for an oper.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatsPSample {
    pub oper: String,
    pub search_oper: String,
    pub mask: String,
    pub ts: DateTime<Utc>,
}

/// A per-oper preference value, stored as JSON.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Preference {
    pub oper: String,
    pub search_oper: String,
    pub key: String,
    pub value: serde_json::Value,
}

/// A NickServ account registration.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Registration {
    pub id: i64,
    pub nickname: String,
    pub search_nickname: String,
    pub account: String,
    pub search_account: String,
    pub email: String,
    pub search_email: String,
    pub ts: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// One node in the MX -> A/AAAA/TXT resolution tree rooted at a
/// registration's e-mail domain.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmailResolve {
    pub id: i64,
    pub registration_id: i64,
    pub parent_id: Option<i64>,
    pub record_type: String,
    pub record: String,
}

/// A NickServ account freeze (supplemental entity, see SPEC_FULL.md §3).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountFreeze {
    pub id: i64,
    pub account: String,
    pub search_account: String,
    pub oper: String,
    pub reason: String,
    pub ts: DateTime<Utc>,
    pub unfrozen_at: Option<DateTime<Utc>>,
}

/// An OperServ channel closure (supplemental entity).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelClose {
    pub id: i64,
    pub channel: String,
    pub search_channel: String,
    pub oper: String,
    pub reason: String,
    pub ts: DateTime<Utc>,
    pub reopened_at: Option<DateTime<Utc>>,
}

/// An OperServ `KLINECHAN:ON` entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KlineChan {
    pub id: i64,
    pub channel: String,
    pub search_channel: String,
    pub oper: String,
    pub reason: String,
    pub ts: DateTime<Utc>,
}

/// A single probe hit: an id paired with the timestamp used to order and
/// dedupe results across multiple index probes (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub id: i64,
    pub ts_unix: i64,
}
