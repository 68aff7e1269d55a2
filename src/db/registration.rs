//! NickServ account registrations and the e-mail resolution tree
//! (spec §3/§4.5).

use super::models::{EmailResolve, Registration};
use super::StoreError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct RegistrationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RegistrationRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        nickname: &str,
        search_nickname: &str,
        account: &str,
        search_account: &str,
        email: &str,
        search_email: &str,
        ts: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO registrations
                (nickname, search_nickname, account, search_account, email, search_email, ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(nickname)
        .bind(search_nickname)
        .bind(account)
        .bind(search_account)
        .bind(email)
        .bind(search_email)
        .bind(ts)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    pub async fn mark_verified(&self, id: i64, ts: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE registrations SET verified_at = $1 WHERE id = $2")
            .bind(ts)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn latest_for_account(
        &self,
        search_account: &str,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(sqlx::query_as::<_, Registration>(
            "SELECT * FROM registrations WHERE search_account = $1 ORDER BY ts DESC LIMIT 1",
        )
        .bind(search_account)
        .fetch_optional(self.pool)
        .await?)
    }

    /// Record one node of the MX -> A/AAAA/TXT resolution tree.
    pub async fn insert_email_resolve(
        &self,
        registration_id: i64,
        parent_id: Option<i64>,
        record_type: &str,
        record: &str,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO email_resolves (registration_id, parent_id, record_type, record)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(registration_id)
        .bind(parent_id)
        .bind(record_type)
        .bind(record)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    pub async fn email_tree(&self, registration_id: i64) -> Result<Vec<EmailResolve>, StoreError> {
        Ok(sqlx::query_as::<_, EmailResolve>(
            "SELECT * FROM email_resolves WHERE registration_id = $1 ORDER BY id",
        )
        .bind(registration_id)
        .fetch_all(self.pool)
        .await?)
    }
}
