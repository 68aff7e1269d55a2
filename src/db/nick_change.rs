//! Nickname change storage (spec §3/§4.4 `nickchg` handler).

use super::StoreError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct NickChangeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NickChangeRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        cliconn_id: i64,
        nickname: &str,
        search_nickname: &str,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO nick_changes (cliconn_id, nickname, search_nickname, ts) VALUES ($1, $2, $3, $4)",
        )
        .bind(cliconn_id)
        .bind(nickname)
        .bind(search_nickname)
        .bind(ts)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}
