//! K-line kill storage: clients killed while a k-line exit was pending.

use super::models::Hit;
use super::StoreError;
use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use sqlx::PgPool;

pub struct KlineKillRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> KlineKillRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
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
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO kline_kills
                (kline_id, nickname, search_nickname, username, search_username,
                 hostname, search_hostname, ip, ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
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
        .fetch_one(self.pool)
        .await?;

        Ok(id)
    }

    /// Reassign every kill attributed to `old_kline_id` onto `new_kline_id`,
    /// used when a new k-line add supersedes an earlier one for the same
    /// mask (spec §4.4, scenario 3).
    pub async fn reassign(&self, old_kline_id: i64, new_kline_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE kline_kills SET kline_id = $1 WHERE kline_id = $2")
            .bind(new_kline_id)
            .bind(old_kline_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Distinct `nick!user@host` tuples this kline produced, across both
    /// kills and rejects (glossary: Affected = kills ∪ rejects).
    pub async fn affected_for_kline(&self, kline_id: i64) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT nickname, username, hostname FROM kline_kills WHERE kline_id = $1
            UNION
            SELECT nickname, username, hostname FROM kline_rejects WHERE kline_id = $1
            "#,
        )
        .bind(kline_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(nick, user, host)| format!("{nick}!{user}@{host}"))
            .collect())
    }

    pub async fn search_by_nick(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_kline_ids("search_nickname", like_pattern, limit).await
    }

    pub async fn search_by_user(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_kline_ids("search_username", like_pattern, limit).await
    }

    pub async fn search_by_host(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_kline_ids("search_hostname", like_pattern, limit).await
    }

    pub async fn search_by_ip(
        &self,
        cidr: IpNetwork,
        limit: i64,
    ) -> Result<Vec<Hit>, StoreError> {
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT kline_id, ts FROM kline_kills
            WHERE ip << $1
            ORDER BY ts DESC
            LIMIT $2
            "#,
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
            "SELECT kline_id, ts FROM kline_kills WHERE {column} LIKE $1 ESCAPE '\\' ORDER BY ts DESC LIMIT $2"
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
