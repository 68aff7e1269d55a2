//! NickServ account freezes (supplemental entity, spec §3: "Present in the
//! original implementation; kept as it enriches the audit trail").

use super::models::AccountFreeze;
use super::StoreError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct AccountFreezeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AccountFreezeRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn freeze(
        &self,
        account: &str,
        search_account: &str,
        oper: &str,
        reason: &str,
        ts: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO account_freezes (account, search_account, oper, reason, ts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(account)
        .bind(search_account)
        .bind(oper)
        .bind(reason)
        .bind(ts)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Close the most recent open freeze for `search_account`.
    pub async fn unfreeze(&self, search_account: &str, ts: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE account_freezes SET unfrozen_at = $1
            WHERE id = (
                SELECT id FROM account_freezes
                WHERE search_account = $2 AND unfrozen_at IS NULL
                ORDER BY ts DESC LIMIT 1
            )
            "#,
        )
        .bind(ts)
        .bind(search_account)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn active_for_account(
        &self,
        search_account: &str,
    ) -> Result<Option<AccountFreeze>, StoreError> {
        Ok(sqlx::query_as::<_, AccountFreeze>(
            "SELECT * FROM account_freezes WHERE search_account = $1 AND unfrozen_at IS NULL ORDER BY ts DESC LIMIT 1",
        )
        .bind(search_account)
        .fetch_optional(self.pool)
        .await?)
    }
}
