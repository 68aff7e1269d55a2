//! OperServ channel closures (supplemental entity, spec §3/§4.5).

use super::models::ChannelClose;
use super::StoreError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct ChannelCloseRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ChannelCloseRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn close(
        &self,
        channel: &str,
        search_channel: &str,
        oper: &str,
        reason: &str,
        ts: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO channel_closes (channel, search_channel, oper, reason, ts)
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

    /// Mark the most recent open closure for `search_channel` as reopened.
    pub async fn reopen(&self, search_channel: &str, ts: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE channel_closes SET reopened_at = $1
            WHERE id = (
                SELECT id FROM channel_closes
                WHERE search_channel = $2 AND reopened_at IS NULL
                ORDER BY ts DESC LIMIT 1
            )
            "#,
        )
        .bind(ts)
        .bind(search_channel)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn active_for_channel(
        &self,
        search_channel: &str,
    ) -> Result<Option<ChannelClose>, StoreError> {
        Ok(sqlx::query_as::<_, ChannelClose>(
            "SELECT * FROM channel_closes WHERE search_channel = $1 AND reopened_at IS NULL ORDER BY ts DESC LIMIT 1",
        )
        .bind(search_channel)
        .fetch_optional(self.pool)
        .await?)
    }
}
