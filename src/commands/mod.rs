//! Operator command dispatcher (spec §4.6).
//!
//! Gated on an oper-identity message tag by the caller (see
//! [`crate::irc`]) — by the time a line reaches [`dispatch`], the sender
//! is already known to be an identified oper. Unknown commands are
//! silent; everything else returns zero or more NOTICE lines.

pub mod tokenizer;

use crate::db::preference::KNOWN_KEYS;
use crate::db::{Database, StoreError};
use crate::error::CommandError;
use crate::search::{build_like_pattern, looks_like_glob, FieldKind};
use chrono::NaiveDate;
use ipnetwork::IpNetwork;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::str::FromStr;

/// Per-oper state the dispatcher keeps between calls: the last few k-line
/// ids each oper has set, for `ktaglast`.
#[derive(Debug, Clone, Default)]
pub struct State {
    recent_klines_by_oper: HashMap<String, VecDeque<i64>>,
}

const RECENT_KLINES_CAP: usize = 20;
const DEFAULT_LIMIT: i64 = 3;

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `oper` just set `kline_id`, for a later `ktaglast`.
    pub fn record_kline(&mut self, oper: &str, kline_id: i64) {
        let entry = self.recent_klines_by_oper.entry(oper.to_string()).or_default();
        entry.push_front(kline_id);
        entry.truncate(RECENT_KLINES_CAP);
    }

    fn last_n(&self, oper: &str, n: usize) -> Vec<i64> {
        self.recent_klines_by_oper
            .get(oper)
            .map(|d| d.iter().take(n).copied().collect())
            .unwrap_or_default()
    }
}

type HandlerResult<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>, CommandError>> + Send + 'a>>;
type Handler = for<'a> fn(&'a Database, &'a mut State, i64, &'a str, &'a [String]) -> HandlerResult<'a>;

static COMMANDS: &[(&str, Handler)] = &[
    ("help", |db, state, cap, oper, args| Box::pin(cmd_help(db, state, cap, oper, args))),
    ("kcheck", |db, state, cap, oper, args| Box::pin(cmd_kcheck(db, state, cap, oper, args))),
    ("cliconn", |db, state, cap, oper, args| Box::pin(cmd_cliconn(db, state, cap, oper, args))),
    ("ktag", |db, state, cap, oper, args| Box::pin(cmd_ktag(db, state, cap, oper, args))),
    ("unktag", |db, state, cap, oper, args| Box::pin(cmd_unktag(db, state, cap, oper, args))),
    ("ktaglast", |db, state, cap, oper, args| Box::pin(cmd_ktaglast(db, state, cap, oper, args))),
    ("statsp", |db, state, cap, oper, args| Box::pin(cmd_statsp(db, state, cap, oper, args))),
    ("pref", |db, state, cap, oper, args| Box::pin(cmd_pref(db, state, cap, oper, args))),
    ("eval", |db, state, cap, oper, args| Box::pin(cmd_eval(db, state, cap, oper, args))),
];

fn lookup(name: &str) -> Option<Handler> {
    COMMANDS.iter().find(|(n, _)| *n == name).map(|(_, h)| *h)
}

/// Tokenise and dispatch one command line. `oper` is the caller's
/// canonical account name. Returns the NOTICE lines to send back, empty
/// for an unknown command or one producing no output.
pub async fn dispatch(
    db: &Database,
    state: &mut State,
    reject_cap: i64,
    oper: &str,
    line: &str,
) -> Vec<String> {
    let tokens = match tokenizer::tokenize(line) {
        Ok(t) => t,
        Err(e) => return vec![format!("error: {e}")],
    };

    let Some(command) = tokens.first() else {
        return Vec::new();
    };

    let Some(handler) = lookup(command) else {
        return Vec::new();
    };

    match handler(db, state, reject_cap, oper, &tokens[1..]).await {
        Ok(lines) => lines,
        Err(e) => vec![e.to_notice()],
    }
}

async fn cmd_help(
    _db: &Database,
    _state: &mut State,
    _reject_cap: i64,
    _oper: &str,
    args: &[String],
) -> Result<Vec<String>, CommandError> {
    let topic = args.first().map(String::as_str);
    let text = match topic {
        None => "commands: help kcheck cliconn ktag unktag ktaglast statsp pref eval",
        Some("kcheck") => "kcheck <nick|host|mask|ts|tag|reason|id|ip> <query> [count]",
        Some("cliconn") => "cliconn <nick|user|host|real|id|ip> <query> [count]",
        Some("ktag") => "ktag <kline_id> <tag>",
        Some("unktag") => "unktag <kline_id> <tag>",
        Some("ktaglast") => "ktaglast <n> <tag>",
        Some("statsp") => "statsp [YYYY-MM-DD]",
        Some("pref") => "pref [key [value]] -- known keys: statsp, knag",
        Some("eval") => "eval <read-only-query> [limit]",
        Some(other) => return Err(CommandError::NotFound(format!("no help for {other}"))),
    };
    Ok(vec![text.to_string()])
}

async fn cmd_kcheck(
    db: &Database,
    _state: &mut State,
    _reject_cap: i64,
    _oper: &str,
    args: &[String],
) -> Result<Vec<String>, CommandError> {
    let [kind, query, rest @ ..] = args else {
        return Err(CommandError::Parse("usage: kcheck <type> <query> [count]".to_string()));
    };
    let limit = parse_limit(rest)?;

    let hits = match kind.as_str() {
        "nick" => {
            let pattern = like(query, FieldKind::Nick);
            let mut hits = db.kline_kills().search_by_nick(&pattern, limit).await?;
            hits.extend(db.kline_rejects().search_by_nick(&pattern, limit).await?);
            dedupe_and_cap(hits, limit)
        }
        "host" => {
            let pattern = like(query, FieldKind::Host);
            let mut hits = db.kline_kills().search_by_host(&pattern, limit).await?;
            hits.extend(db.kline_rejects().search_by_host(&pattern, limit).await?);
            dedupe_and_cap(hits, limit)
        }
        "mask" => db.klines().search_by_mask(&like(query, FieldKind::Mask), limit).await?,
        "reason" => db.klines().search_by_reason(&like(query, FieldKind::Mask), limit).await?,
        "tag" => db.kline_tags().search_by_tag(&like(query, FieldKind::Tag), limit).await?,
        "id" => {
            let id: i64 = query
                .parse()
                .map_err(|_| CommandError::Parse(format!("not an id: {query}")))?;
            let kline = db.klines().get(id).await?;
            return render_kline(db, &kline).await;
        }
        "ts" => {
            let ts = NaiveDate::parse_from_str(query, "%Y-%m-%d")
                .map_err(|_| CommandError::Parse(format!("not a date: {query}")))?
                .and_hms_opt(0, 0, 0)
                .expect("valid midnight")
                .and_utc();
            db.klines().find_by_ts(ts, 5).await?
        }
        "ip" => search_kline_by_ip(db, query, limit).await?,
        other => return Err(CommandError::Parse(format!("unknown kcheck type: {other}"))),
    };

    render_kline_hits(db, hits).await
}

async fn search_kline_by_ip(
    db: &Database,
    query: &str,
    limit: i64,
) -> Result<Vec<crate::db::models::Hit>, StoreError> {
    if let Ok(cidr) = IpNetwork::from_str(query) {
        return db.klines().search_by_cidr(cidr, limit).await;
    }
    if let Ok(addr) = IpAddr::from_str(query) {
        let cidr = IpNetwork::from(addr);
        return db.klines().search_by_cidr(cidr, limit).await;
    }
    db.klines().search_by_mask(&like(query, FieldKind::Mask), limit).await
}

async fn cmd_cliconn(
    db: &Database,
    _state: &mut State,
    _reject_cap: i64,
    _oper: &str,
    args: &[String],
) -> Result<Vec<String>, CommandError> {
    let [kind, query, rest @ ..] = args else {
        return Err(CommandError::Parse("usage: cliconn <type> <query> [count]".to_string()));
    };
    let limit = parse_limit(rest)?;

    let hits = match kind.as_str() {
        "nick" => db.cliconns().search_by_nick(&like(query, FieldKind::Nick), limit).await?,
        "user" => db.cliconns().search_by_user(&like(query, FieldKind::User), limit).await?,
        "host" => db.cliconns().search_by_host(&like(query, FieldKind::Host), limit).await?,
        "real" => db.cliconns().search_by_real(&like(query, FieldKind::Real), limit).await?,
        "id" => {
            let id: i64 = query
                .parse()
                .map_err(|_| CommandError::Parse(format!("not an id: {query}")))?;
            let conn = db.cliconns().get(id).await?;
            return Ok(vec![format_cliconn(&conn)]);
        }
        "ip" => {
            let cidr = parse_ip_or_cidr(query)?;
            db.cliconns().search_by_ip(cidr, limit).await?
        }
        other => return Err(CommandError::Parse(format!("unknown cliconn type: {other}"))),
    };

    let mut lines = Vec::with_capacity(hits.len());
    for hit in dedupe_and_cap(hits, limit) {
        let conn = db.cliconns().get(hit.id).await?;
        lines.push(format_cliconn(&conn));
    }
    Ok(lines)
}

async fn cmd_ktag(
    db: &Database,
    _state: &mut State,
    _reject_cap: i64,
    oper: &str,
    args: &[String],
) -> Result<Vec<String>, CommandError> {
    let [id, tag] = args else {
        return Err(CommandError::Parse("usage: ktag <kline_id> <tag>".to_string()));
    };
    let kline_id: i64 = id.parse().map_err(|_| CommandError::Parse(format!("not an id: {id}")))?;
    db.klines().get(kline_id).await?;

    db.kline_tags()
        .add(
            kline_id,
            tag,
            &crate::search::normalise_plain(tag, FieldKind::Tag),
            "ktag",
            oper,
            chrono::Utc::now(),
        )
        .await?;
    Ok(vec![format!("tagged kline #{kline_id} with {tag}")])
}

async fn cmd_unktag(
    db: &Database,
    _state: &mut State,
    _reject_cap: i64,
    _oper: &str,
    args: &[String],
) -> Result<Vec<String>, CommandError> {
    let [id, tag] = args else {
        return Err(CommandError::Parse("usage: unktag <kline_id> <tag>".to_string()));
    };
    let kline_id: i64 = id.parse().map_err(|_| CommandError::Parse(format!("not an id: {id}")))?;
    let removed = db
        .kline_tags()
        .remove(kline_id, &crate::search::normalise_plain(tag, FieldKind::Tag))
        .await?;
    if removed {
        Ok(vec![format!("untagged kline #{kline_id}: {tag}")])
    } else {
        Err(CommandError::NotFound(format!("kline #{kline_id} has no tag {tag}")))
    }
}

async fn cmd_ktaglast(
    db: &Database,
    state: &mut State,
    _reject_cap: i64,
    oper: &str,
    args: &[String],
) -> Result<Vec<String>, CommandError> {
    let [n, tag] = args else {
        return Err(CommandError::Parse("usage: ktaglast <n> <tag>".to_string()));
    };
    let n: usize = n.parse().map_err(|_| CommandError::Parse(format!("not a count: {n}")))?;
    let ids = state.last_n(oper, n);
    if ids.is_empty() {
        return Err(CommandError::NotFound("no recent k-lines for this oper".to_string()));
    }

    let search_tag = crate::search::normalise_plain(tag, FieldKind::Tag);
    let ts = chrono::Utc::now();
    for id in &ids {
        db.kline_tags().add(*id, tag, &search_tag, "ktaglast", oper, ts).await?;
    }
    Ok(vec![format!("tagged {} k-line(s) with {tag}", ids.len())])
}

async fn cmd_statsp(
    db: &Database,
    _state: &mut State,
    _reject_cap: i64,
    _oper: &str,
    args: &[String],
) -> Result<Vec<String>, CommandError> {
    let since = match args.first() {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| CommandError::Parse(format!("not a date: {s}")))?,
        None => chrono::Utc::now().date_naive(),
    };
    let totals = db.statsp().totals_since(since).await?;
    if totals.is_empty() {
        return Ok(vec!["no on-duty samples recorded".to_string()]);
    }
    Ok(totals
        .into_iter()
        .map(|(oper, minutes)| format!("{oper}: {minutes} minute(s)"))
        .collect())
}

async fn cmd_pref(
    db: &Database,
    _state: &mut State,
    _reject_cap: i64,
    oper: &str,
    args: &[String],
) -> Result<Vec<String>, CommandError> {
    let search_oper = crate::search::normalise_plain(oper, FieldKind::Nick);

    match args {
        [] => {
            let list = db.preferences().list(oper, &search_oper).await?;
            Ok(list.into_iter().map(|(k, v)| format!("{k} = {v}")).collect())
        }
        [key] => {
            let value = db
                .preferences()
                .get(oper, &search_oper, key)
                .await
                .map_err(unknown_preference_to_parse_error)?;
            Ok(vec![format!("{key} = {value}")])
        }
        [key, value, ..] => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                return Err(CommandError::Parse(format!("unknown preference: {key}")));
            }
            let parsed = parse_pref_value(value)?;
            db.preferences().set(oper, &search_oper, key, parsed).await?;
            Ok(vec![format!("{key} set to {value}")])
        }
    }
}

fn unknown_preference_to_parse_error(e: StoreError) -> CommandError {
    match e {
        StoreError::UnknownPreference(k) => CommandError::Parse(format!("unknown preference: {k}")),
        other => CommandError::Store(other),
    }
}

fn parse_pref_value(raw: &str) -> Result<serde_json::Value, CommandError> {
    match raw {
        "true" | "on" | "yes" => Ok(serde_json::Value::Bool(true)),
        "false" | "off" | "no" => Ok(serde_json::Value::Bool(false)),
        other => Err(CommandError::Parse(format!("not a boolean: {other}"))),
    }
}

async fn cmd_eval(
    db: &Database,
    _state: &mut State,
    _reject_cap: i64,
    _oper: &str,
    args: &[String],
) -> Result<Vec<String>, CommandError> {
    if args.is_empty() {
        return Err(CommandError::Parse("usage: eval <query> [limit]".to_string()));
    }
    let (query_parts, limit) = if let Ok(n) = args[args.len() - 1].parse::<i64>() {
        (&args[..args.len() - 1], n)
    } else {
        (&args[..], DEFAULT_LIMIT)
    };
    if query_parts.is_empty() {
        return Err(CommandError::Parse("usage: eval <query> [limit]".to_string()));
    }
    let query = query_parts.join(" ");

    let result = db.eval().run(&query, limit).await?;
    let mut lines = vec![result.columns.join(" | ")];
    for row in result.rows {
        lines.push(row.join(" | "));
    }
    Ok(lines)
}

fn parse_limit(rest: &[String]) -> Result<i64, CommandError> {
    match rest.first() {
        None => Ok(DEFAULT_LIMIT),
        Some(s) => s.parse().map_err(|_| CommandError::Parse(format!("not a count: {s}"))),
    }
}

fn parse_ip_or_cidr(raw: &str) -> Result<IpNetwork, CommandError> {
    if let Ok(cidr) = IpNetwork::from_str(raw) {
        return Ok(cidr);
    }
    IpAddr::from_str(raw)
        .map(IpNetwork::from)
        .map_err(|_| CommandError::Parse(format!("not an address or CIDR: {raw}")))
}

fn like(raw: &str, kind: FieldKind) -> String {
    if looks_like_glob(raw) {
        build_like_pattern(raw, kind)
    } else {
        build_like_pattern(&format!("*{raw}*"), kind)
    }
}

fn dedupe_and_cap(hits: Vec<crate::db::models::Hit>, limit: i64) -> Vec<crate::db::models::Hit> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<_> = hits.into_iter().filter(|h| seen.insert(h.id)).collect();
    out.sort_by(|a, b| b.ts_unix.cmp(&a.ts_unix));
    out.truncate(limit.max(0) as usize);
    out
}

async fn render_kline_hits(
    db: &Database,
    hits: Vec<crate::db::models::Hit>,
) -> Result<Vec<String>, CommandError> {
    let mut lines = Vec::with_capacity(hits.len());
    for hit in hits {
        let kline = db.klines().get(hit.id).await?;
        lines.extend(render_kline(db, &kline).await?);
    }
    Ok(lines)
}

/// Render one kline as the kline line plus its affected-users line (spec
/// §8 scenario 1): `#id mask by oper (ts) (removed by X) -- reason`
/// followed by `affected: nick!user@host, ...` when it produced any kills
/// or rejects.
async fn render_kline(
    db: &Database,
    kline: &crate::db::models::Kline,
) -> Result<Vec<String>, CommandError> {
    let remove = db.klines().get_remove(kline.id).await?;
    let mut lines = vec![format_kline(kline, remove.as_ref())];

    let affected = db.kline_kills().affected_for_kline(kline.id).await?;
    if !affected.is_empty() {
        lines.push(format!("affected: {}", affected.join(", ")));
    }

    Ok(lines)
}

fn format_kline(k: &crate::db::models::Kline, remove: Option<&crate::db::models::KlineRemove>) -> String {
    let annotation = match remove {
        Some(r) => format!(" (removed by {})", r.oper.as_deref().unwrap_or("unknown")),
        None if k.expire.is_some_and(|e| e <= chrono::Utc::now()) => " (expired)".to_string(),
        None => String::new(),
    };
    format!(
        "#{} {} by {} ({}){} -- {}",
        k.id,
        k.mask,
        k.oper,
        k.ts.format("%Y-%m-%d %H:%M"),
        annotation,
        k.reason
    )
}

fn format_cliconn(c: &crate::db::models::Cliconn) -> String {
    format!(
        "#{} {}!{}@{} [{}] on {} ({})",
        c.id,
        c.nickname,
        c.username,
        c.hostname,
        c.account.as_deref().unwrap_or("*"),
        c.server,
        c.ts.format("%Y-%m-%d %H:%M")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_produces_no_handler() {
        assert!(lookup("frobnicate").is_none());
    }

    #[test]
    fn known_commands_resolve() {
        for name in ["help", "kcheck", "cliconn", "ktag", "unktag", "ktaglast", "statsp", "pref", "eval"] {
            assert!(lookup(name).is_some(), "{name} should resolve");
        }
    }

    #[test]
    fn dedupe_and_cap_sorts_descending_and_truncates() {
        let hits = vec![
            crate::db::models::Hit { id: 1, ts_unix: 10 },
            crate::db::models::Hit { id: 2, ts_unix: 30 },
            crate::db::models::Hit { id: 1, ts_unix: 10 },
            crate::db::models::Hit { id: 3, ts_unix: 20 },
        ];
        let capped = dedupe_and_cap(hits, 2);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].id, 2);
        assert_eq!(capped[1].id, 3);
    }

    #[test]
    fn record_kline_keeps_most_recent_first() {
        let mut state = State::new();
        state.record_kline("jess", 1);
        state.record_kline("jess", 2);
        state.record_kline("jess", 3);
        assert_eq!(state.last_n("jess", 2), vec![3, 2]);
    }

    fn sample_kline(expire: Option<chrono::DateTime<chrono::Utc>>) -> crate::db::models::Kline {
        crate::db::models::Kline {
            id: 1,
            mask: "*@1.2.3.4".to_string(),
            search_mask: "*@1.2.3.4".to_string(),
            source: "server.example".to_string(),
            oper: "jess".to_string(),
            duration_s: Some(300),
            reason: "spam %spam".to_string(),
            ts: chrono::Utc::now(),
            expire,
            last_reject: None,
        }
    }

    #[test]
    fn format_kline_with_no_remove_or_expiry_has_no_annotation() {
        let kline = sample_kline(Some(chrono::Utc::now() + chrono::Duration::seconds(300)));
        let line = format_kline(&kline, None);
        assert!(!line.contains("removed by"));
        assert!(!line.contains("expired"));
        assert!(line.starts_with("#1 *@1.2.3.4 by jess"));
        assert!(line.ends_with("-- spam %spam"));
    }

    #[test]
    fn format_kline_annotates_removal() {
        let kline = sample_kline(Some(chrono::Utc::now() + chrono::Duration::seconds(300)));
        let remove = crate::db::models::KlineRemove {
            kline_id: 1,
            source: Some("server.example".to_string()),
            oper: Some("alyce".to_string()),
            ts: chrono::Utc::now(),
        };
        let line = format_kline(&kline, Some(&remove));
        assert!(line.contains("(removed by alyce)"));
    }

    #[test]
    fn format_kline_annotates_expiry_when_unremoved() {
        let kline = sample_kline(Some(chrono::Utc::now() - chrono::Duration::seconds(10)));
        let line = format_kline(&kline, None);
        assert!(line.contains("(expired)"));
    }
}
