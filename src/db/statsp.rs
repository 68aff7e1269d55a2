//! On-duty sampling (spec §4.7, the minutely sampler M).

use super::StoreError;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

pub struct StatsPRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StatsPRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append one on-duty sample. `ts` is expected to already be truncated
    /// to the minute boundary by the caller (spec §9).
    pub async fn insert(
        &self,
        oper: &str,
        search_oper: &str,
        mask: &str,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO statsp_samples (oper, search_oper, mask, ts) VALUES ($1, $2, $3, $4)",
        )
        .bind(oper)
        .bind(search_oper)
        .bind(mask)
        .bind(ts)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Total on-duty minutes per oper, counting samples since `since`.
    pub async fn totals_since(&self, since: NaiveDate) -> Result<Vec<(String, i64)>, StoreError> {
        let since_ts = since.and_hms_opt(0, 0, 0).expect("valid midnight").and_utc();
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT oper, COUNT(*) AS minutes
            FROM statsp_samples
            WHERE ts >= $1
            GROUP BY oper
            ORDER BY minutes DESC
            "#,
        )
        .bind(since_ts)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
