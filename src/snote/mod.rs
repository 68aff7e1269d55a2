//! Server notice dispatcher and the in-memory indices it keeps (spec §4.4).
//!
//! `State` holds nothing but ordinary struct fields — there is no global
//! singleton here, by design (spec §9): a second `State` is just a second,
//! independent auditing session.

pub mod nickserv;
pub mod operserv;
pub mod patterns;

use crate::db::{Database, StoreError};
use crate::search::{normalise_plain, FieldKind};
use chrono::Utc;
use ipnetwork::IpNetwork;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{debug, warn};

/// What a caller must do after a `handle` call returns. Most notices need
/// nothing further; netjoin and a fresh k-line both need IO the parser
/// itself doesn't own (talking to the IRC session, telling the log
/// channel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    /// A new k-line was recorded; the id and setting oper are handed back
    /// so the caller can relay it to the log channel / knag surface and
    /// feed the command dispatcher's `ktaglast` history.
    KlineAdded { kline_id: i64, oper: String },
    /// The far side of a split just rejoined. The caller should query
    /// `LINKS` and a mask-trace and feed the results back via
    /// [`State::resync`].
    NeedsResync,
}

/// What a client looked like the last time we heard about it, kept around
/// so netsplit can evict by origin server and cliexit/nickchg can find the
/// connection id without a round trip to the store.
#[derive(Debug, Clone)]
pub(crate) struct User {
    cliconn_id: i64,
    username: String,
    hostname: String,
    server: String,
}

/// The server links graph, as last observed. Adjacency is undirected: a
/// netsplit names the edge that broke, and every server reachable only
/// through the far end of that edge is considered split off with it.
#[derive(Debug, Clone, Default)]
struct LinksGraph {
    edges: HashMap<String, HashSet<String>>,
}

impl LinksGraph {
    fn link(&mut self, a: &str, b: &str) {
        self.edges.entry(a.to_string()).or_default().insert(b.to_string());
        self.edges.entry(b.to_string()).or_default().insert(a.to_string());
    }

    /// Remove the edge `a <-> b`, then return every server that becomes
    /// unreachable from `a` as a result — i.e. the set of servers that just
    /// split away with `b`.
    fn split(&mut self, a: &str, b: &str) -> HashSet<String> {
        if let Some(neighbours) = self.edges.get_mut(a) {
            neighbours.remove(b);
        }
        if let Some(neighbours) = self.edges.get_mut(b) {
            neighbours.remove(a);
        }

        let reachable_from_a = self.reachable(a);
        let all_servers: HashSet<String> = self.edges.keys().cloned().collect();
        all_servers
            .difference(&reachable_from_a)
            .cloned()
            .collect()
    }

    fn reachable(&self, from: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![from.to_string()];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            if let Some(neighbours) = self.edges.get(&node) {
                for n in neighbours {
                    if !seen.contains(n) {
                        stack.push(n.clone());
                    }
                }
            }
        }
        seen
    }

    fn replace(&mut self, links: &[(String, String)]) {
        self.edges.clear();
        for (a, b) in links {
            self.link(a, b);
        }
    }
}

/// Per-session snote parser state: nick -> connection record, nick ->
/// pending k-line-exit mask, and the server links graph.
#[derive(Debug, Clone, Default)]
pub struct State {
    users: HashMap<String, User>,
    kline_waiting_exit: HashMap<String, String>,
    links: LinksGraph,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one snote line (`message`, the text after `*** Notice --`
    /// is included, per Solanum wording) to its handler. `source` is the
    /// message prefix — for server notices, the originating server name.
    pub async fn handle(
        &mut self,
        db: &Database,
        reject_cap: i64,
        source: &str,
        message: &str,
    ) -> Result<Effect, StoreError> {
        if let Some(caps) = patterns::CLICONN.captures(message) {
            self.handle_cliconn(db, source, &caps).await?;
        } else if let Some(caps) = patterns::CLIEXIT.captures(message) {
            return self.handle_cliexit(db, &caps).await;
        } else if let Some(caps) = patterns::NICKCHG.captures(message) {
            self.handle_nickchg(db, &caps).await?;
        } else if let Some(caps) = patterns::KLINEADD.captures(message) {
            return self.handle_klineadd(db, &caps).await;
        } else if let Some(caps) = patterns::KLINEDEL.captures(message) {
            self.handle_klinedel(db, &caps).await?;
        } else if let Some(caps) = patterns::KLINEEXIT.captures(message) {
            self.handle_klineexit(&caps);
        } else if let Some(caps) = patterns::KLINEREJ.captures(message) {
            self.handle_klinerej(db, reject_cap, &caps).await?;
        } else if let Some(caps) = patterns::NETSPLIT.captures(message) {
            self.handle_netsplit(&caps);
        } else if patterns::NETJOIN.is_match(message) {
            return Ok(Effect::NeedsResync);
        } else {
            debug!(message, "unrecognised snote");
        }

        Ok(Effect::None)
    }

    /// Feed back the results of a `LINKS` + mask-trace query requested via
    /// [`Effect::NeedsResync`].
    pub fn resync(&mut self, links: &[(String, String)], users: Vec<(String, User)>) {
        self.links.replace(links);
        self.users.clear();
        for (nick, user) in users {
            self.users.insert(nick, user);
        }
    }

    /// Refresh only the links graph from a `LINKS` reply, leaving the
    /// known-users index untouched. Mask-trace has no documented wire
    /// contract upstream (spec §9 asymmetry note covers a related gap);
    /// clients that split off were already evicted by [`Self::handle`]'s
    /// netsplit handling, and clients that reconnect repopulate the index
    /// through ordinary cliconn snotes, so a links-only refresh is safe.
    pub fn relink(&mut self, links: &[(String, String)]) {
        self.links.replace(links);
    }

    async fn handle_cliconn(
        &mut self,
        db: &Database,
        server: &str,
        caps: &regex::Captures<'_>,
    ) -> Result<(), StoreError> {
        let nick = &caps["nick"];
        let user = &caps["user"];
        let host = &caps["host"];
        let real = &caps["real"];
        let ip = parse_optional_ip(&caps["ip"]);
        let account = parse_optional_account(&caps["account"]);
        let ts = Utc::now();

        let id = db
            .cliconns()
            .insert(
                nick,
                &normalise_plain(nick, FieldKind::Nick),
                user,
                &normalise_plain(user, FieldKind::User),
                real,
                &normalise_plain(real, FieldKind::Real),
                host,
                &normalise_plain(host, FieldKind::Host),
                account.as_deref(),
                ip.map(IpNetwork::from),
                server,
                ts,
            )
            .await?;

        self.users.insert(
            nick.to_string(),
            User {
                cliconn_id: id,
                username: user.to_string(),
                hostname: host.to_string(),
                server: server.to_string(),
            },
        );

        Ok(())
    }

    async fn handle_cliexit(
        &mut self,
        db: &Database,
        caps: &regex::Captures<'_>,
    ) -> Result<Effect, StoreError> {
        let nick = &caps["nick"];
        let user = &caps["user"];
        let host = &caps["host"];
        let reason = &caps["reason"];
        let ip = parse_optional_ip(&caps["ip"]);
        let ts = Utc::now();

        let cliconn_id = self.users.remove(nick).map(|u| u.cliconn_id);

        db.cliexits()
            .insert(
                cliconn_id,
                nick,
                &normalise_plain(nick, FieldKind::Nick),
                user,
                &normalise_plain(user, FieldKind::User),
                host,
                &normalise_plain(host, FieldKind::Host),
                ip.map(IpNetwork::from),
                reason,
                ts,
            )
            .await?;

        let Some(mask) = self.kline_waiting_exit.remove(nick) else {
            return Ok(Effect::None);
        };

        let Some(kline_id) = db.klines().find_active(&mask).await? else {
            return Ok(Effect::None);
        };

        db.kline_kills()
            .insert(
                kline_id,
                nick,
                &normalise_plain(nick, FieldKind::Nick),
                user,
                &normalise_plain(user, FieldKind::User),
                host,
                &normalise_plain(host, FieldKind::Host),
                ip.map(IpNetwork::from),
                ts,
            )
            .await?;

        Ok(Effect::None)
    }

    async fn handle_nickchg(
        &mut self,
        db: &Database,
        caps: &regex::Captures<'_>,
    ) -> Result<(), StoreError> {
        let old_nick = &caps["old_nick"];
        let new_nick = &caps["new_nick"];

        let Some(user) = self.users.remove(old_nick) else {
            return Ok(());
        };

        let cliconn_id = user.cliconn_id;
        self.users.insert(new_nick.to_string(), user);

        db.nick_changes()
            .insert(
                cliconn_id,
                new_nick,
                &normalise_plain(new_nick, FieldKind::Nick),
                Utc::now(),
            )
            .await
    }

    async fn handle_klineadd(
        &mut self,
        db: &Database,
        caps: &regex::Captures<'_>,
    ) -> Result<Effect, StoreError> {
        let source = &caps["source"];
        let oper = &caps["oper"];
        let mask = &caps["mask"];
        let duration_min: i64 = caps["duration"].parse().unwrap_or(0);
        let reason = &caps["reason"];
        let ts = Utc::now();

        let (kline_id, superseded) = db
            .klines()
            .insert(
                mask,
                &normalise_plain(mask, FieldKind::Mask),
                source,
                oper,
                Some(duration_min * 60),
                reason,
                ts,
            )
            .await?;

        for tag in crate::db::kline_tag::extract_tags(reason) {
            db.kline_tags()
                .add(
                    kline_id,
                    &tag,
                    &normalise_plain(&tag, FieldKind::Tag),
                    source,
                    oper,
                    ts,
                )
                .await?;
        }

        if let Some(old_id) = superseded {
            db.kline_kills().reassign(old_id, kline_id).await?;
        }

        Ok(Effect::KlineAdded {
            kline_id,
            oper: oper.to_string(),
        })
    }

    async fn handle_klinedel(
        &mut self,
        db: &Database,
        caps: &regex::Captures<'_>,
    ) -> Result<(), StoreError> {
        let source = &caps["source"];
        let oper = &caps["oper"];
        let mask = &caps["mask"];

        let Some(kline_id) = db.klines().find_active(mask).await? else {
            return Ok(());
        };

        db.klines()
            .remove(kline_id, Some(source), Some(oper), Utc::now())
            .await
    }

    fn handle_klineexit(&mut self, caps: &regex::Captures<'_>) {
        let nick = caps["nick"].to_string();
        let mask = caps["mask"].to_string();
        // the IP isn't in this snote; wait for the cliexit that follows.
        self.kline_waiting_exit.insert(nick, mask);
    }

    async fn handle_klinerej(
        &mut self,
        db: &Database,
        reject_cap: i64,
        caps: &regex::Captures<'_>,
    ) -> Result<(), StoreError> {
        let nick = &caps["nick"];
        let user = &caps["user"];
        let host = &caps["host"];
        let mask = &caps["mask"];
        let ip = parse_optional_ip(&caps["ip"]);
        let ts = Utc::now();

        let Some(kline_id) = db.klines().find_active(mask).await? else {
            return Ok(());
        };

        db.klines().set_last_reject(kline_id, ts).await?;

        db.kline_rejects()
            .insert_deduped(
                kline_id,
                nick,
                &normalise_plain(nick, FieldKind::Nick),
                user,
                &normalise_plain(user, FieldKind::User),
                host,
                &normalise_plain(host, FieldKind::Host),
                ip.map(IpNetwork::from),
                ts,
                reject_cap,
            )
            .await?;

        Ok(())
    }

    fn handle_netsplit(&mut self, caps: &regex::Captures<'_>) {
        let server1 = &caps["server1"];
        let server2 = &caps["server2"];

        let lost = self.links.split(server1, server2);
        self.users.retain(|_, user| !lost.contains(&user.server));
    }
}

fn parse_optional_ip(raw: &str) -> Option<IpAddr> {
    if raw == "0" {
        return None;
    }
    IpAddr::from_str(raw).ok()
}

fn parse_optional_account(raw: &str) -> Option<String> {
    if raw == "*" {
        None
    } else {
        Some(raw.to_string())
    }
}
