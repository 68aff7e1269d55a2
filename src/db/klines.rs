//! K-line storage: insert, supersession, active-set queries (spec §3, §4.4).

use super::models::{Hit, Kline, KlineRemove};
use super::StoreError;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

pub struct KlineRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> KlineRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new k-line. If an existing active k-line shares the exact
    /// same mask, it is left in place (the caller reassigns its kills via
    /// [`super::kline_kill::KlineKillRepository::reassign`]) and its id is
    /// returned as the supersession target.
    pub async fn insert(
        &self,
        mask: &str,
        search_mask: &str,
        source: &str,
        oper: &str,
        duration_s: Option<i64>,
        reason: &str,
        ts: DateTime<Utc>,
    ) -> Result<(i64, Option<i64>), StoreError> {
        let superseded = self.find_active(mask).await?;

        let expire = duration_s.map(|d| ts + Duration::seconds(d));

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO klines (mask, search_mask, source, oper, duration_s, reason, ts, expire)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(mask)
        .bind(search_mask)
        .bind(source)
        .bind(oper)
        .bind(duration_s)
        .bind(reason)
        .bind(ts)
        .bind(expire)
        .fetch_one(self.pool)
        .await?;

        Ok((id, superseded))
    }

    /// Attribute a removal to `oper`, or record a silent (server-side)
    /// removal with `source`/`oper` left null.
    pub async fn remove(
        &self,
        kline_id: i64,
        source: Option<&str>,
        oper: Option<&str>,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kline_removes (kline_id, source, oper, ts)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kline_id) DO NOTHING
            "#,
        )
        .bind(kline_id)
        .bind(source)
        .bind(oper)
        .bind(ts)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Kline, StoreError> {
        sqlx::query_as::<_, Kline>("SELECT * FROM klines WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(StoreError::KlineNotFound(id))
    }

    pub async fn get_remove(&self, kline_id: i64) -> Result<Option<KlineRemove>, StoreError> {
        Ok(
            sqlx::query_as::<_, KlineRemove>("SELECT * FROM kline_removes WHERE kline_id = $1")
                .bind(kline_id)
                .fetch_optional(self.pool)
                .await?,
        )
    }

    pub async fn set_last_reject(&self, id: i64, ts: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE klines SET last_reject = $1 WHERE id = $2")
            .bind(ts)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// The most recent id for a k-line with this exact mask that has not
    /// been removed and has not expired.
    pub async fn find_active(&self, mask: &str) -> Result<Option<i64>, StoreError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT k.id FROM klines k
            LEFT JOIN kline_removes r ON r.kline_id = k.id
            WHERE k.mask = $1
              AND r.kline_id IS NULL
              AND (k.expire IS NULL OR k.expire > now())
            ORDER BY k.ts DESC
            LIMIT 1
            "#,
        )
        .bind(mask)
        .fetch_optional(self.pool)
        .await?)
    }

    /// mask -> id for every currently active k-line.
    pub async fn list_active(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT k.mask, k.id FROM klines k
            LEFT JOIN kline_removes r ON r.kline_id = k.id
            WHERE r.kline_id IS NULL
              AND (k.expire IS NULL OR k.expire > now())
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// K-lines whose minute-truncated `ts` is within `fudge_minutes` of `t`.
    pub async fn find_by_ts(
        &self,
        t: DateTime<Utc>,
        fudge_minutes: i64,
    ) -> Result<Vec<Hit>, StoreError> {
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, ts FROM klines
            WHERE DATE_TRUNC('minute', ts) BETWEEN
                  DATE_TRUNC('minute', $1::timestamptz - ($2 || ' minutes')::interval)
              AND DATE_TRUNC('minute', $1::timestamptz + ($2 || ' minutes')::interval)
            ORDER BY ts DESC
            "#,
        )
        .bind(t)
        .bind(fudge_minutes.to_string())
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

    pub async fn search_by_mask(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        self.search_by_column("search_mask", like_pattern, limit).await
    }

    pub async fn search_by_reason(
        &self,
        like_pattern: &str,
        limit: i64,
    ) -> Result<Vec<Hit>, StoreError> {
        self.search_by_column("reason", like_pattern, limit).await
    }

    async fn search_by_column(
        &self,
        column: &str,
        like_pattern: &str,
        limit: i64,
    ) -> Result<Vec<Hit>, StoreError> {
        let sql = format!(
            "SELECT id, ts FROM klines WHERE {column} LIKE $1 ESCAPE '\\' ORDER BY ts DESC LIMIT $2"
        );
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(&sql)
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

    /// IP/CIDR containment probe: k-lines whose mask resolves to an address
    /// within `cidr` (used for `kcheck ip` when the query is a bare address
    /// or CIDR rather than a glob).
    pub async fn search_by_cidr(
        &self,
        cidr: ipnetwork::IpNetwork,
        limit: i64,
    ) -> Result<Vec<Hit>, StoreError> {
        // klines don't carry a parsed IP column (the mask may be a glob); we
        // instead probe the kills/rejects tables by IP containment and join
        // back to the owning kline. See KlineKillRepository/KlineRejectRepository.
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT DISTINCT k.id, k.ts FROM klines k
            JOIN kline_kills kk ON kk.kline_id = k.id
            WHERE kk.ip << $1
            ORDER BY k.ts DESC
            LIMIT $2
            "#,
        )
        .bind(cidr)
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
