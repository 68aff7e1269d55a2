//! K-line tags: `%tag` tokens extracted from a reason, or added via `ktag`.

use super::models::Hit;
use super::StoreError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct KlineTagRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> KlineTagRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn add(
        &self,
        kline_id: i64,
        tag: &str,
        search_tag: &str,
        source: &str,
        oper: &str,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kline_tags (kline_id, tag, search_tag, source, oper, ts)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (kline_id, search_tag) DO NOTHING
            "#,
        )
        .bind(kline_id)
        .bind(tag)
        .bind(search_tag)
        .bind(source)
        .bind(oper)
        .bind(ts)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, kline_id: i64, search_tag: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM kline_tags WHERE kline_id = $1 AND search_tag = $2")
            .bind(kline_id)
            .bind(search_tag)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn for_kline(&self, kline_id: i64) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT tag FROM kline_tags WHERE kline_id = $1 ORDER BY ts")
                .bind(kline_id)
                .fetch_all(self.pool)
                .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    pub async fn search_by_tag(&self, like_pattern: &str, limit: i64) -> Result<Vec<Hit>, StoreError> {
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT t.kline_id, k.ts FROM kline_tags t
            JOIN klines k ON k.id = t.kline_id
            WHERE t.search_tag LIKE $1 ESCAPE '\'
            ORDER BY k.ts DESC
            LIMIT $2
            "#,
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

/// Extract `%tag` tokens from a k-line reason string, per spec §4.4/§4.5.
/// A tag is a run of non-whitespace characters following an unescaped `%`.
pub fn extract_tags(reason: &str) -> Vec<String> {
    reason
        .split_whitespace()
        .filter_map(|word| word.strip_prefix('%'))
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_multiple_tags_in_order() {
        assert_eq!(
            extract_tags("spam bot %spam %botnet"),
            vec!["spam".to_string(), "botnet".to_string()]
        );
    }

    #[test]
    fn reason_with_no_tags_yields_empty() {
        assert!(extract_tags("open proxy").is_empty());
    }
}
