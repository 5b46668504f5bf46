use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Pooled SQLite connection, schema-initialized on construction. Mirrors
/// spec.md §6's table layout (`trades`, `signals`, `account_snapshots`,
/// `daily_performance`).
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .idle_timeout(Duration::from_secs(3600))
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .context("failed to connect to SQLite database")?;

        info!(db_url, "connected to persistence store");

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                instrument TEXT NOT NULL,
                kind TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                ref_price REAL NOT NULL,
                stop_loss REAL,
                take_profit REAL,
                confidence REAL NOT NULL,
                strategy_name TEXT NOT NULL,
                reason TEXT NOT NULL,
                ml_enhanced BOOLEAN NOT NULL DEFAULT 0,
                ml_confidence REAL,
                sentiment_label TEXT,
                sentiment_confidence REAL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create signals table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_signals_account_instrument_time \
             ON signals (account_id, instrument, generated_at);",
        )
        .execute(&mut *conn)
        .await
        .context("failed to create signals index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket INTEGER,
                account_id TEXT NOT NULL,
                instrument TEXT NOT NULL,
                side TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_price REAL NOT NULL,
                entry_time TEXT NOT NULL,
                volume REAL NOT NULL,
                stop_loss REAL,
                take_profit REAL,
                exit_price REAL,
                exit_time TEXT,
                profit REAL,
                pips REAL,
                strategy_name TEXT NOT NULL,
                ml_enhanced BOOLEAN NOT NULL DEFAULT 0,
                ai_approved BOOLEAN NOT NULL DEFAULT 1,
                ai_reason TEXT,
                signal_id INTEGER,
                audit_created_at TEXT NOT NULL,
                audit_updated_at TEXT NOT NULL,
                FOREIGN KEY (signal_id) REFERENCES signals(id)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create trades table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trades_account_status \
             ON trades (account_id, status);",
        )
        .execute(&mut *conn)
        .await
        .context("failed to create trades status index")?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_trades_ticket \
             ON trades (ticket) WHERE ticket IS NOT NULL;",
        )
        .execute(&mut *conn)
        .await
        .context("failed to create trades ticket index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS account_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                broker TEXT NOT NULL,
                server TEXT NOT NULL,
                balance REAL NOT NULL,
                equity REAL NOT NULL,
                profit REAL NOT NULL,
                margin REAL NOT NULL,
                free_margin REAL NOT NULL,
                open_position_count INTEGER NOT NULL,
                total_volume REAL NOT NULL,
                sampled_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create account_snapshots table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_account_time \
             ON account_snapshots (account_id, sampled_at);",
        )
        .execute(&mut *conn)
        .await
        .context("failed to create account_snapshots index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_performance (
                account_id TEXT NOT NULL,
                trading_day DATE NOT NULL,
                trades INTEGER NOT NULL DEFAULT 0,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                gross_profit REAL NOT NULL DEFAULT 0,
                gross_loss REAL NOT NULL DEFAULT 0,
                net_profit REAL NOT NULL DEFAULT 0,
                win_rate REAL,
                profit_factor REAL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (account_id, trading_day)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create daily_performance table")?;

        info!("persistence schema initialized");
        Ok(())
    }
}
