//! NickServ notice parser (spec §4.5).
//!
//! Messages look like `nickname (account) COMMAND: args` or, when no
//! account tag is present on the line, `nickname COMMAND: args`.

use crate::db::{Database, StoreError};
use crate::dns::{recursive_mx_resolve, Resolver};
use crate::search::{normalise_plain, FieldKind};
use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static RE_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?x)^\S+(?:\ \((?P<account>[^)]*)\))?\ (?P<command>\S+):(?:\ (?P<args>.*))?$")
        .expect("valid nickserv command regex")
});

static RE_REGISTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<account>\S+) to (?P<email>\S+)$").expect("valid"));

static RE_VERIFY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<account>\S+) ").expect("valid"));

static RE_FREEZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<account>\S+) \(reason: (?P<reason>.*)\)$").expect("valid"));

/// Tracks which registration id an in-progress account maps to, so a
/// follow-up `VERIFY:REGISTER` or `SET:ACCOUNTNAME` line can find it
/// without a store round trip.
#[derive(Debug, Clone, Default)]
pub struct State {
    registration_ids: HashMap<String, i64>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn handle(
        &mut self,
        db: &Database,
        resolver: &dyn Resolver,
        message: &str,
    ) -> Result<(), StoreError> {
        let Some(caps) = RE_COMMAND.captures(message) else {
            return Ok(());
        };
        let command = &caps["command"];
        let args = caps.name("args").map(|m| m.as_str()).unwrap_or("");
        let account = caps.name("account").map(|m| m.as_str());

        match command {
            "REGISTER" => self.handle_register(db, resolver, args).await,
            "DROP" => {
                self.registration_ids.remove(args);
                Ok(())
            }
            "SET:ACCOUNTNAME" => {
                if let Some(old_account) = account {
                    if let Some(registration_id) = self.registration_ids.remove(old_account) {
                        self.registration_ids.insert(args.to_string(), registration_id);
                    }
                }
                Ok(())
            }
            "VERIFY:REGISTER" => self.handle_verify(db, args).await,
            "FREEZE" => self.handle_freeze(db, args).await,
            "UNFREEZE" => self.handle_unfreeze(db, args).await,
            _ => Ok(()),
        }
    }

    async fn handle_register(
        &mut self,
        db: &Database,
        resolver: &dyn Resolver,
        args: &str,
    ) -> Result<(), StoreError> {
        let Some(caps) = RE_REGISTER.captures(args) else {
            return Ok(());
        };
        let account = &caps["account"];
        let email = &caps["email"];
        let ts = Utc::now();

        let registration_id = db
            .registrations()
            .insert(
                account,
                &normalise_plain(account, FieldKind::Nick),
                account,
                &normalise_plain(account, FieldKind::Nick),
                email,
                &normalise_plain(email, FieldKind::Email),
                ts,
            )
            .await?;

        self.registration_ids.insert(account.to_string(), registration_id);

        if let Some((_, domain)) = email.split_once('@') {
            let resolved = recursive_mx_resolve(resolver, domain).await;
            let mut db_ids = Vec::with_capacity(resolved.len());
            for record in &resolved {
                let parent_id = record.parent.map(|i| db_ids[i]);
                let id = db
                    .registrations()
                    .insert_email_resolve(
                        registration_id,
                        parent_id,
                        record.record_type.as_str(),
                        &record.value,
                    )
                    .await?;
                db_ids.push(id);
            }
        }

        Ok(())
    }

    async fn handle_verify(&mut self, db: &Database, args: &str) -> Result<(), StoreError> {
        let Some(caps) = RE_VERIFY.captures(args) else {
            return Ok(());
        };
        let account = &caps["account"];
        let Some(&registration_id) = self.registration_ids.get(account) else {
            return Ok(());
        };
        db.registrations().mark_verified(registration_id, Utc::now()).await
    }

    async fn handle_freeze(&mut self, db: &Database, args: &str) -> Result<(), StoreError> {
        let Some(caps) = RE_FREEZE.captures(args) else {
            return Ok(());
        };
        let account = &caps["account"];
        let reason = &caps["reason"];
        db.account_freezes()
            .freeze(
                account,
                &normalise_plain(account, FieldKind::Nick),
                "operserv",
                reason,
                Utc::now(),
            )
            .await?;
        Ok(())
    }

    async fn handle_unfreeze(&mut self, db: &Database, args: &str) -> Result<(), StoreError> {
        let account = args.trim();
        if account.is_empty() {
            return Ok(());
        }
        db.account_freezes()
            .unfreeze(&normalise_plain(account, FieldKind::Nick), Utc::now())
            .await?;
        Ok(())
    }
}
