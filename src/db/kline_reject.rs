//! K-line reject storage: connection attempts denied by an active k-line,
//! deduped and capped per (kline, host) per spec §3/§4.4.

use super::models::Hit;
use super::StoreError;
use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use sqlx::PgPool;

pub struct KlineRejectRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> KlineRejectRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a reject row unless one already exists for this
    /// (kline, nick, user, host, ip), and unless the per-host cap for this
    /// kline has already been reached. Returns `true` if a row was inserted.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_deduped(
        &self,
        kline_id: i64,
        nickname: &str,
        search_nickname: &str,
        username: &str,
        search_username: &str,
        hostname: &str,
        search_hostname: &str,
        ip: Option<IpNetwork>,
        ts: DateTime<Utc>,
        reject_cap: i64,
    ) -> Result<bool, StoreError> {
        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM kline_rejects
            WHERE kline_id = $1 AND search_nickname = $2 AND search_username = $3
              AND search_hostname = $4 AND ip IS NOT DISTINCT FROM $5
            "#,
        )
        .bind(kline_id)
        .bind(search_nickname)
        .bind(search_username)
        .bind(search_hostname)
        .bind(ip)
        .fetch_optional(self.pool)
        .await?;

        if existing.is_some() {
            return Ok(false);
        }

        let host_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM kline_rejects WHERE kline_id = $1 AND search_hostname = $2",
        )
        .bind(kline_id)
        .bind(search_hostname)
        .fetch_one(self.pool)
        .await?;

        if host_count >= reject_cap {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO kline_rejects
                (kline_id, nickname, search_nickname, username, search_username,
                 hostname, search_hostname, ip, ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(kline_id)
        .bind(nickname)
        .bind(search_nickname)
        .bind(username)
        .bind(search_username)
        .bind(hostname)
        .bind(search_hostname)
        .bind(ip)
        .bind(ts)
        .execute(self.pool)
        .await?;

        Ok(true)
    }

    pub async fn search_by_nick(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_kline_ids("search_nickname", like_pattern, limit).await
    }

    pub async fn search_by_host(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_kline_ids("search_hostname", like_pattern, limit).await
    }

    pub async fn search_by_ip(&self, cidr: IpNetwork, limit: i64) -> Result<Vec<Hit>, StoreError> {
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT kline_id, ts FROM kline_rejects WHERE ip << $1 ORDER BY ts DESC LIMIT $2",
        )
        .bind(cidr)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(to_hits(rows))
    }

    async fn search_kline_ids(
        &self,
        column: &str,
        like_pattern: &str,
        limit: i64,
    ) -> Result<Vec<Hit>, StoreError> {
        let sql = format!(
            "SELECT kline_id, ts FROM kline_rejects WHERE {column} LIKE $1 ESCAPE '\\' ORDER BY ts DESC LIMIT $2"
        );
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(&sql)
            .bind(like_pattern)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        Ok(to_hits(rows))
    }
}

fn to_hits(rows: Vec<(i64, DateTime<Utc>)>) -> Vec<Hit> {
    rows.into_iter()
        .map(|(id, ts)| Hit {
            id,
            ts_unix: ts.timestamp(),
        })
        .collect()
}
