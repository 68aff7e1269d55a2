//! OperServ `KLINECHAN:ON` entries (supplemental entity, spec §3/§4.5),
//! with `%tag` extraction identical to k-line tags.

use super::models::Hit;
use super::StoreError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct KlineChanRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> KlineChanRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        channel: &str,
        search_channel: &str,
        oper: &str,
        reason: &str,
        ts: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO klinechan (channel, search_channel, oper, reason, ts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(channel)
        .bind(search_channel)
        .bind(oper)
        .bind(reason)
        .bind(ts)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Record one `%tag` token extracted from a `KLINECHAN:ON` reason,
    /// identical in shape to [`super::kline_tag::KlineTagRepository::add`].
    pub async fn add_tag(
        &self,
        klinechan_id: i64,
        tag: &str,
        search_tag: &str,
        oper: &str,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO klinechan_tags (klinechan_id, tag, search_tag, oper, ts)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (klinechan_id, search_tag) DO NOTHING
            "#,
        )
        .bind(klinechan_id)
        .bind(tag)
        .bind(search_tag)
        .bind(oper)
        .bind(ts)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn search_by_channel(
        &self,
        like_pattern: &str,
        limit: i64,
    ) -> Result<Vec<Hit>, StoreError> {
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, ts FROM klinechan WHERE search_channel LIKE $1 ESCAPE '\\' ORDER BY ts DESC LIMIT $2",
        )
        .bind(like_pattern)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, ts)| Hit {
                id,
                ts_unix: ts.timestamp(),
            })
            .collect())
    }
}
