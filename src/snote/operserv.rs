//! OperServ notice parser (spec §4.5).

use crate::db::{Database, StoreError};
use crate::search::{normalise_plain, FieldKind};
use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

static RE_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?x)^\S+(?:\ \((?P<account>[^)]*)\))?\ (?P<command>\S+):(?:\ (?P<args>.*))?$")
        .expect("valid operserv command regex")
});

static RE_KLINECHAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<channel>\S+) \(reason: (?P<reason>.*)\)$").expect("valid"));

static RE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<channel>\S+) \(reason: (?P<reason>.*)\)$").expect("valid"));

pub async fn handle(db: &Database, message: &str) -> Result<(), StoreError> {
    let Some(caps) = RE_COMMAND.captures(message) else {
        return Ok(());
    };
    let command = &caps["command"];
    let args = caps.name("args").map(|m| m.as_str()).unwrap_or("");
    // the source oper's services account, when tagged on the line, takes
    // precedence over their nick (mirrors upstream's `soper_account or soper`).
    let soper_account = caps.name("account").map(|m| m.as_str());

    match command {
        "KLINECHAN:ON" => handle_klinechan_on(db, args, soper_account).await,
        "CLOSE" => handle_close(db, args).await,
        "UNCLOSE" => handle_unclose(db, args).await,
        _ => Ok(()),
    }
}

async fn handle_klinechan_on(
    db: &Database,
    args: &str,
    soper_account: Option<&str>,
) -> Result<(), StoreError> {
    let Some(caps) = RE_KLINECHAN.captures(args) else {
        return Ok(());
    };
    let channel = &caps["channel"];
    let reason = &caps["reason"];
    let oper = soper_account.unwrap_or("unknown");
    let ts = Utc::now();

    let klinechan_id = db
        .klinechan()
        .insert(channel, &normalise_plain(channel, FieldKind::Host), oper, reason, ts)
        .await?;

    // %tag tokens are extracted the same way as k-line tags (spec §4.5).
    for tag in crate::db::kline_tag::extract_tags(reason) {
        db.klinechan()
            .add_tag(klinechan_id, &tag, &normalise_plain(&tag, FieldKind::Tag), oper, ts)
            .await?;
    }

    Ok(())
}

async fn handle_close(db: &Database, args: &str) -> Result<(), StoreError> {
    let Some(caps) = RE_CLOSE.captures(args) else {
        return Ok(());
    };
    let channel = &caps["channel"];
    let reason = &caps["reason"];
    db.channel_closes()
        .close(
            channel,
            &normalise_plain(channel, FieldKind::Host),
            "operserv",
            reason,
            Utc::now(),
        )
        .await?;
    Ok(())
}

async fn handle_unclose(db: &Database, args: &str) -> Result<(), StoreError> {
    let channel = args.trim();
    if channel.is_empty() {
        return Ok(());
    }
    db.channel_closes()
        .reopen(&normalise_plain(channel, FieldKind::Host), Utc::now())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn klinechan_args_split_channel_and_reason() {
        let caps = RE_KLINECHAN
            .captures("#spam (reason: known spam channel %spam)")
            .expect("matches");
        assert_eq!(&caps["channel"], "#spam");
        assert_eq!(&caps["reason"], "known spam channel %spam");
    }

    #[test]
    fn command_regex_captures_soper_account() {
        let caps = RE_COMMAND
            .captures("jess (jess) KLINECHAN:ON: #spam (reason: spam)")
            .expect("matches");
        assert_eq!(&caps["command"], "KLINECHAN:ON");
        assert_eq!(&caps["account"], "jess");
    }
}
