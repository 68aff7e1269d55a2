//! Client connection storage (spec §3/§4.4 `cliconn` handler).

use super::models::{Cliconn, Hit};
use super::StoreError;
use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use sqlx::PgPool;

pub struct CliconnRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CliconnRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        nickname: &str,
        search_nickname: &str,
        username: &str,
        search_username: &str,
        realname: &str,
        search_realname: &str,
        hostname: &str,
        search_hostname: &str,
        account: Option<&str>,
        ip: Option<IpNetwork>,
        server: &str,
        ts: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cliconns
                (nickname, search_nickname, username, search_username,
                 realname, search_realname, hostname, search_hostname,
                 account, ip, server, ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(nickname)
        .bind(search_nickname)
        .bind(username)
        .bind(search_username)
        .bind(realname)
        .bind(search_realname)
        .bind(hostname)
        .bind(search_hostname)
        .bind(account)
        .bind(ip)
        .bind(server)
        .bind(ts)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Cliconn, StoreError> {
        sqlx::query_as::<_, Cliconn>("SELECT * FROM cliconns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(StoreError::CliconnNotFound(id))
    }

    pub async fn search_by_nick(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_by_column("search_nickname", like_pattern, limit).await
    }

    pub async fn search_by_user(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_by_column("search_username", like_pattern, limit).await
    }

    pub async fn search_by_host(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_by_column("search_hostname", like_pattern, limit).await
    }

    pub async fn search_by_real(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_by_column("search_realname", like_pattern, limit).await
    }

    pub async fn search_by_ip(&self, cidr: IpNetwork, limit: i64) -> Result<Vec<Hit>, StoreError> {
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, ts FROM cliconns WHERE ip << $1 ORDER BY ts DESC LIMIT $2",
        )
        .bind(cidr)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(to_hits(rows))
    }

    async fn search_by_column(
        &self,
        column: &str,
        like_pattern: &str,
        limit: i64,
    ) -> Result<Vec<Hit>, StoreError> {
        let sql = format!(
            "SELECT id, ts FROM cliconns WHERE {column} LIKE $1 ESCAPE '\\' ORDER BY ts DESC LIMIT $2"
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
