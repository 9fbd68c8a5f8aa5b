use crate::fingerprint::VisitFingerprint;
use crate::models::{CounterRow, Dimension, VisitTotals};
use crate::storage::trait_def::{expiry_millis, now_millis};
use crate::storage::{CounterStore, DedupStore, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create tables and the dimension index
    pub async fn init(&self) -> Result<()> {
        // Expiring fingerprint markers
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visit_locks (
                fingerprint TEXT PRIMARY KEY,
                recorded_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_visit_locks_expires_at ON visit_locks(expires_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        // Durable aggregate counters
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visit_counters (
                dimension_key TEXT PRIMARY KEY,
                dimension TEXT NOT NULL,
                label TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_visit_counters_dimension ON visit_counters(dimension)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DedupStore for SqliteStorage {
    async fn check_and_mark(
        &self,
        fingerprint: &VisitFingerprint,
        window: Duration,
    ) -> StorageResult<bool> {
        let now = now_millis();
        let expires_at = expiry_millis(now, window);

        // Inserts a new marker or replaces an expired one; a live marker is left alone
        let result = sqlx::query(
            r#"
            INSERT INTO visit_locks (fingerprint, recorded_at, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                recorded_at = excluded.recorded_at,
                expires_at = excluded.expires_at
            WHERE visit_locks.expires_at <= excluded.recorded_at
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(now)
        .bind(expires_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 0)
    }

    async fn prune_expired(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM visit_locks WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CounterStore for SqliteStorage {
    async fn increment(&self, dimension: &Dimension) -> StorageResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO visit_counters (dimension_key, dimension, label, count)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(dimension_key) DO UPDATE SET count = visit_counters.count + 1
            RETURNING count
            "#,
        )
        .bind(dimension.key())
        .bind(dimension.kind())
        .bind(dimension.label())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn get_totals(&self) -> StorageResult<VisitTotals> {
        let rows = sqlx::query_as::<_, CounterRow>(
            r#"
            SELECT dimension, label, count
            FROM visit_counters
            WHERE dimension IN ('total', 'country', 'device')
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(VisitTotals::from_rows(rows))
    }

    async fn reset(&self, dimension: &Dimension) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM visit_counters WHERE dimension_key = ?")
            .bind(dimension.key())
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
