//! operaudit - operator-facing auditing bot for a Solanum IRC network.

mod commands;
mod config;
mod db;
mod dns;
mod error;
mod irc;
mod reconciler;
mod sampler;
mod search;
mod snote;

use crate::config::Config;
use crate::db::Database;
use crate::dns::SystemResolver;
use crate::irc::{IrcHandle, SessionError};
use slirc_proto::{Command, Message, Prefix, Response};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(300);
const LINKS_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());

    // Config errors are reported before tracing is initialised (spec §6,
    // §7) since the logging format itself comes from the config.
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config at {config_path}: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    let db = match Database::connect(&config.database.dsn).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "failed to connect to the database");
            std::process::exit(1);
        }
    };

    let mut backoff = INITIAL_BACKOFF;
    loop {
        match run_session(&config, &db).await {
            Ok(()) => {
                info!("session ended cleanly, reconnecting");
                backoff = INITIAL_BACKOFF;
            }
            Err(e) => {
                warn!(error = %e, backoff_secs = backoff.as_secs(), "session ended, reconnecting after backoff");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = config
        .logging
        .filter
        .clone()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Connect, run the reconciliator once and the minutely sampler forever,
/// and drive the dispatch loop until the connection drops. A transient
/// network failure surfaces here as `Err` for the outer backoff loop;
/// nothing here ever calls `process::exit`.
async fn run_session(config: &Config, db: &Database) -> Result<(), SessionError> {
    let irc = irc::connect(config).await?;
    info!("session established");

    if let Err(e) = reconciler::reconcile(&irc, db).await {
        warn!(error = %e, "k-line reconciliation failed");
    }

    let sampler_irc = irc.clone();
    let sampler_db = db.clone();
    let sampler_task = tokio::spawn(async move {
        loop {
            sampler::sleep_until_next_minute().await;
            let ts = sampler::truncate_to_minute(chrono::Utc::now());
            if let Err(e) = sampler::sample(&sampler_irc, &sampler_db, ts).await {
                warn!(error = %e, "minutely sample failed");
            }
        }
    });

    let result = dispatch_loop(config, db, &irc).await;
    sampler_task.abort();
    result
}

/// The main event loop: every parsed message the session delivers is
/// routed to the snote parser, the NickServ/OperServ parsers, or the
/// command dispatcher, in arrival order (spec §5 — snote handling is
/// strictly serialised per connection).
async fn dispatch_loop(config: &Config, db: &Database, irc: &IrcHandle) -> Result<(), SessionError> {
    let mut events = irc.subscribe();
    let mut snote_state = snote::State::new();
    let mut nickserv_state = snote::nickserv::State::new();
    let mut command_state = commands::State::new();
    let resolver = SystemResolver::new();

    loop {
        let message = match events.recv().await {
            Ok(message) => message,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "dispatch loop lagged behind the event stream");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(SessionError::ClosedDuring("dispatch loop"));
            }
        };

        if let Err(e) = handle_message(
            config,
            db,
            irc,
            &mut snote_state,
            &mut nickserv_state,
            &mut command_state,
            &resolver,
            &message,
        )
        .await
        {
            warn!(error = %e, "store error handling message");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_message(
    config: &Config,
    db: &Database,
    irc: &IrcHandle,
    snote_state: &mut snote::State,
    nickserv_state: &mut snote::nickserv::State,
    command_state: &mut commands::State,
    resolver: &SystemResolver,
    message: &Message,
) -> Result<(), db::StoreError> {
    match &message.command {
        Command::NOTICE(target, text) if target == "*" => {
            if let Some(Prefix::ServerName(source)) = &message.prefix {
                match snote_state.handle(db, config.reject_cap, source, text).await? {
                    snote::Effect::KlineAdded { kline_id, oper } => {
                        command_state.record_kline(&oper, kline_id);
                        let _ = irc.send(Command::NOTICE(
                            config.log_channel.clone(),
                            format!("k-line #{kline_id} set by {oper}"),
                        ));
                    }
                    snote::Effect::NeedsResync => {
                        if let Err(e) = resync_links(irc, snote_state).await {
                            warn!(error = %e, "post-netjoin LINKS resync failed");
                        }
                    }
                    snote::Effect::None => {}
                }
            }
        }
        Command::NOTICE(_, text) => {
            if let Some(nick) = message.prefix.as_ref().and_then(Prefix::nick) {
                if nick.eq_ignore_ascii_case("NickServ") {
                    nickserv_state.handle(db, resolver, text).await?;
                } else if nick.eq_ignore_ascii_case("OperServ") {
                    snote::operserv::handle(db, text).await?;
                }
            }
        }
        Command::PRIVMSG(target, text) if target == &config.server.nickname => {
            if let Some(oper) = message.tag_value(irc::OPER_TAG) {
                let oper = oper.to_string();
                let reply_to = message
                    .prefix
                    .as_ref()
                    .and_then(Prefix::nick)
                    .unwrap_or(oper.as_str())
                    .to_string();
                let lines = commands::dispatch(db, command_state, config.reject_cap, &oper, text).await;
                for line in lines {
                    let _ = irc.send(Command::NOTICE(reply_to.clone(), line));
                }
            }
        }
        // A channel highlight: "botnick: kcheck ..." or "botnick, kcheck ...".
        // Replies go back to the channel, not the caller (spec §4.6).
        Command::PRIVMSG(target, text) if is_channel(target) => {
            if let Some(rest) = strip_highlight(text, &config.server.nickname) {
                if let Some(oper) = message.tag_value(irc::OPER_TAG) {
                    let oper = oper.to_string();
                    let lines = commands::dispatch(db, command_state, config.reject_cap, &oper, rest).await;
                    for line in lines {
                        let _ = irc.send(Command::NOTICE(target.clone(), line));
                    }
                }
            }
        }
        _ => {}
    }

    Ok(())
}

fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&'])
}

/// Strip a leading `botnick:` / `botnick,` / `botnick ` highlight prefix
/// from a channel message, returning the remainder if the message was
/// actually addressed to us.
fn strip_highlight<'a>(text: &'a str, nickname: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(nickname)?;
    match rest.chars().next() {
        Some(':') | Some(',') => Some(rest[1..].trim_start()),
        Some(c) if c.is_whitespace() => Some(rest.trim_start()),
        _ => None,
    }
}

/// Rebuild the links graph from a fresh `LINKS` reply (spec §4.4's
/// `Effect::NeedsResync`; see [`snote::State::relink`] for why the
/// known-users index is left alone).
async fn resync_links(irc: &IrcHandle, snote_state: &mut snote::State) -> Result<(), SessionError> {
    irc.send(Command::LINKS(None, None))?;

    let mut edges = Vec::new();
    loop {
        let message = irc
            .wait_for("links resync", LINKS_TIMEOUT, |m| {
                matches!(&m.command, Command::Response(r, _)
                    if *r == Response::RPL_LINKS || *r == Response::RPL_ENDOFLINKS)
            })
            .await?;

        match &message.command {
            Command::Response(r, params) if *r == Response::RPL_LINKS => {
                if let (Some(child), Some(parent)) = (params.get(1), params.get(2)) {
                    edges.push((parent.clone(), child.clone()));
                }
            }
            Command::Response(r, _) if *r == Response::RPL_ENDOFLINKS => break,
            _ => {}
        }
    }

    snote_state.relink(&edges);
    info!(edges = edges.len(), "links graph resynced");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_target_recognised() {
        assert!(is_channel("#opers"));
        assert!(is_channel("&local"));
        assert!(!is_channel("operaudit"));
    }

    #[test]
    fn highlight_colon_and_comma() {
        assert_eq!(strip_highlight("operaudit: kcheck nick foo", "operaudit"), Some("kcheck nick foo"));
        assert_eq!(strip_highlight("operaudit, kcheck nick foo", "operaudit"), Some("kcheck nick foo"));
        assert_eq!(strip_highlight("operaudit kcheck nick foo", "operaudit"), Some("kcheck nick foo"));
    }

    #[test]
    fn highlight_requires_word_boundary() {
        assert_eq!(strip_highlight("operauditx: kcheck nick foo", "operaudit"), None);
        assert_eq!(strip_highlight("unrelated text", "operaudit"), None);
    }
}
