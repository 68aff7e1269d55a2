//! Per-oper preferences (spec §4.6 `pref` command).
//!
//! The recognised keys are fixed: `statsp` (bool, default true) and `knag`
//! (bool, default false). Values are stored as JSON so the schema does not
//! need to change if a future key carries a non-boolean value.

use super::StoreError;
use serde_json::Value;
use sqlx::PgPool;

pub struct PreferenceRepository<'a> {
    pool: &'a PgPool,
}

/// Preference keys recognised by `pref` (spec §4.6).
pub const KNOWN_KEYS: &[&str] = &["statsp", "knag"];

impl<'a> PreferenceRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, oper: &str, search_oper: &str, key: &str) -> Result<Value, StoreError> {
        if !KNOWN_KEYS.contains(&key) {
            return Err(StoreError::UnknownPreference(key.to_string()));
        }

        let stored: Option<Value> = sqlx::query_scalar(
            "SELECT value FROM preferences WHERE search_oper = $1 AND key = $2",
        )
        .bind(search_oper)
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        Ok(stored.unwrap_or_else(|| default_for(key)))
    }

    pub async fn set(
        &self,
        oper: &str,
        search_oper: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        if !KNOWN_KEYS.contains(&key) {
            return Err(StoreError::UnknownPreference(key.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO preferences (oper, search_oper, key, value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (search_oper, key) DO UPDATE SET value = EXCLUDED.value, oper = EXCLUDED.oper
            "#,
        )
        .bind(oper)
        .bind(search_oper)
        .bind(key)
        .bind(value)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// List every known key's current (possibly default) value for `oper`.
    pub async fn list(&self, oper: &str, search_oper: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let mut out = Vec::with_capacity(KNOWN_KEYS.len());
        for key in KNOWN_KEYS {
            out.push((key.to_string(), self.get(oper, search_oper, key).await?));
        }
        Ok(out)
    }

    /// Whether minutely sampling is enabled for `oper` (default true).
    pub async fn statsp_enabled(&self, oper: &str, search_oper: &str) -> Result<bool, StoreError> {
        Ok(self
            .get(oper, search_oper, "statsp")
            .await?
            .as_bool()
            .unwrap_or(true))
    }
}

fn default_for(key: &str) -> Value {
    match key {
        "statsp" => Value::Bool(true),
        "knag" => Value::Bool(false),
        _ => Value::Null,
    }
}
