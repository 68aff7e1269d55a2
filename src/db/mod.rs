//! Relational store for the audit trail (spec §3, §4.3).
//!
//! Targets PostgreSQL specifically: the k-line reconciliator and `kcheck ip`
//! probes rely on native CIDR containment (`<<`), and the on-duty sampler's
//! minute-truncation relies on `DATE_TRUNC`. Every repository method returns
//! a typed [`StoreError`]; nothing panics on a malformed row.

pub mod account_freeze;
pub mod channel_close;
pub mod cliconn;
pub mod cliexit;
pub mod eval;
pub mod kline_kill;
pub mod kline_reject;
pub mod kline_tag;
pub mod klinechan;
pub mod klines;
pub mod models;
pub mod nick_change;
pub mod preference;
pub mod registration;
pub mod statsp;

pub use account_freeze::AccountFreezeRepository;
pub use channel_close::ChannelCloseRepository;
pub use cliconn::CliconnRepository;
pub use cliexit::CliexitRepository;
pub use eval::EvalRepository;
pub use kline_kill::KlineKillRepository;
pub use kline_reject::KlineRejectRepository;
pub use kline_tag::KlineTagRepository;
pub use klinechan::KlineChanRepository;
pub use klines::KlineRepository;
pub use nick_change::NickChangeRepository;
pub use preference::PreferenceRepository;
pub use registration::RegistrationRepository;
pub use statsp::StatsPRepository;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors surfaced by any store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("kline not found: {0}")]
    KlineNotFound(i64),
    #[error("cliconn not found: {0}")]
    CliconnNotFound(i64),
    #[error("unknown preference: {0}")]
    UnknownPreference(String),
    #[error("invalid address or CIDR: {0}")]
    InvalidAddress(String),
}

/// The store's connection pool, plus the per-entity repositories layered
/// over it.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connect to `dsn`, running embedded migrations if needed.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let options: PgConnectOptions = dsn.parse()?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .idle_timeout(Some(Self::IDLE_TIMEOUT))
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        info!("database connected");

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded migrations.
    /// Checks for each table and runs the full migration if any are missing.
    async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
        async fn table_exists(pool: &PgPool, table: &str) -> bool {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
            )
            .bind(table)
            .fetch_one(pool)
            .await
            .unwrap_or(false)
        }

        // 001_init.sql: the core audit schema (klines through registrations).
        let core_tables = [
            "klines",
            "kline_removes",
            "kline_kills",
            "kline_rejects",
            "kline_tags",
            "cliconns",
            "cliexits",
            "nick_changes",
            "statsp_samples",
            "preferences",
            "registrations",
            "email_resolves",
        ];
        let mut core_ok = true;
        for t in core_tables {
            if !table_exists(pool, t).await {
                core_ok = false;
                break;
            }
        }
        if !core_ok {
            Self::run_migration_file(pool, include_str!("../../migrations/001_init.sql")).await;
            info!("database migrations applied (001_init)");
        }

        // 002_supplemental.sql: account freezes, channel closures, klinechan.
        let supplemental_tables = ["account_freezes", "channel_closes", "klinechan", "klinechan_tags"];
        let mut supplemental_ok = true;
        for t in supplemental_tables {
            if !table_exists(pool, t).await {
                supplemental_ok = false;
                break;
            }
        }
        if !supplemental_ok {
            Self::run_migration_file(
                pool,
                include_str!("../../migrations/002_supplemental.sql"),
            )
            .await;
            info!("database migrations applied (002_supplemental)");
        }

        if core_ok && supplemental_ok {
            info!("database already initialized");
        }

        Ok(())
    }

    /// Run a single migration file, executing each statement.
    async fn run_migration_file(pool: &PgPool, migration: &str) {
        for statement in migration.split(';') {
            let mut sql_lines: Vec<&str> = Vec::new();
            for line in statement.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with("--") {
                    continue;
                }
                sql_lines.push(line);
            }

            if sql_lines.is_empty() {
                continue;
            }

            let sql = sql_lines.join("\n");

            if let Err(e) = sqlx::query(&sql).execute(pool).await {
                let err_str = e.to_string();
                if !err_str.contains("already exists") {
                    tracing::warn!(sql = %sql, error = %e, "migration statement failed");
                }
            }
        }
    }

    pub fn klines(&self) -> KlineRepository<'_> {
        KlineRepository::new(&self.pool)
    }
    pub fn kline_kills(&self) -> KlineKillRepository<'_> {
        KlineKillRepository::new(&self.pool)
    }
    pub fn kline_rejects(&self) -> KlineRejectRepository<'_> {
        KlineRejectRepository::new(&self.pool)
    }
    pub fn kline_tags(&self) -> KlineTagRepository<'_> {
        KlineTagRepository::new(&self.pool)
    }
    pub fn cliconns(&self) -> CliconnRepository<'_> {
        CliconnRepository::new(&self.pool)
    }
    pub fn cliexits(&self) -> CliexitRepository<'_> {
        CliexitRepository::new(&self.pool)
    }
    pub fn nick_changes(&self) -> NickChangeRepository<'_> {
        NickChangeRepository::new(&self.pool)
    }
    pub fn statsp(&self) -> StatsPRepository<'_> {
        StatsPRepository::new(&self.pool)
    }
    pub fn preferences(&self) -> PreferenceRepository<'_> {
        PreferenceRepository::new(&self.pool)
    }
    pub fn registrations(&self) -> RegistrationRepository<'_> {
        RegistrationRepository::new(&self.pool)
    }
    pub fn account_freezes(&self) -> AccountFreezeRepository<'_> {
        AccountFreezeRepository::new(&self.pool)
    }
    pub fn channel_closes(&self) -> ChannelCloseRepository<'_> {
        ChannelCloseRepository::new(&self.pool)
    }
    pub fn klinechan(&self) -> KlineChanRepository<'_> {
        KlineChanRepository::new(&self.pool)
    }
    pub fn eval(&self) -> EvalRepository<'_> {
        EvalRepository::new(&self.pool)
    }
}
