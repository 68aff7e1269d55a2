//! Read-only ad-hoc SQL evaluator for the `eval` command (spec §4.8).
//!
//! Runs the operator-supplied query inside a transaction marked
//! `READ ONLY` and rolls it back unconditionally, so `eval` can never
//! mutate the store regardless of what the caller typed. No SQL dialect
//! is reimplemented here; this is a thin wrapper around a real Postgres
//! connection and its own read-only transaction enforcement.

use super::StoreError;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo};

pub struct EvalRepository<'a> {
    pool: &'a PgPool,
}

/// A tabulated result set: column names plus stringified rows, ready to be
/// split across NOTICE lines by the command dispatcher.
pub struct EvalResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl<'a> EvalRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn run(&self, query: &str, limit: i64) -> Result<EvalResult, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;

        let rows: Vec<PgRow> = sqlx::query(query).fetch_all(&mut *tx).await?;

        // Always rolled back: READ ONLY already forbids mutation, this is
        // belt-and-braces so a caller can never accidentally commit.
        tx.rollback().await?;

        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let tabulated = rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|row| stringify_row(&row))
            .collect();

        Ok(EvalResult {
            columns,
            rows: tabulated,
        })
    }
}

fn stringify_row(row: &PgRow) -> Vec<String> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| stringify_cell(row, i, col.type_info().name()))
        .collect()
}

fn stringify_cell(row: &PgRow, idx: usize, type_name: &str) -> String {
    match type_name {
        "INT2" | "INT4" | "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| v.to_string()),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| v.to_string()),
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(|v| v.to_string()),
        "TIMESTAMPTZ" | "TIMESTAMP" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| v.to_rfc3339()),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten(),
    }
    .unwrap_or_else(|| "NULL".to_string())
}
