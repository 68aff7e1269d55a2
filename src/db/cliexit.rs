//! Client disconnection storage (spec §3/§4.4 `cliexit` handler).

use super::StoreError;
use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use sqlx::PgPool;

pub struct CliexitRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CliexitRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// `cliconn_id` is `None` when no matching connect was observed since
    /// startup (spec §4.4: "A cliexit with no matching cliconn is allowed").
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        cliconn_id: Option<i64>,
        nickname: &str,
        search_nickname: &str,
        username: &str,
        search_username: &str,
        hostname: &str,
        search_hostname: &str,
        ip: Option<IpNetwork>,
        reason: &str,
        ts: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cliexits
                (cliconn_id, nickname, search_nickname, username, search_username,
                 hostname, search_hostname, ip, reason, ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(cliconn_id)
        .bind(nickname)
        .bind(search_nickname)
        .bind(username)
        .bind(search_username)
        .bind(hostname)
        .bind(search_hostname)
        .bind(ip)
        .bind(reason)
        .bind(ts)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }
}
