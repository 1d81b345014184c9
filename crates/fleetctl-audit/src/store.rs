//! Durable, queryable append-only log of audit events.
//!
//! One `audit_logs` table, indexed on `timestamp_ms`, with three
//! denormalized nullable columns (`actor_email`, `resource_id`,
//! `cluster_id`) extracted from `data` at write time so common query paths
//! don't need to deserialize the payload. `COUNT(*)` and
//! `ORDER BY timestamp LIMIT` are avoided on the hot path; see
//! `maybe_cleanup_by_size` for why.

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::error::{AuditError, Result};
use crate::event::{AuditEvent, AuditEventData, EventType};

/// Size-based cleanup never deletes more than this many rows in one pass,
/// bounding the worst-case latency of a single `Write` call that happens
/// to trigger cleanup.
const REMOVE_BY_SIZE_BATCH_CAP: i64 = 1000;

#[derive(Debug, Clone)]
pub struct AuditStoreConfig {
    /// Bounds every pool operation (write, cleanup, read-range).
    pub operation_timeout: Duration,
    /// Byte target for size-based cleanup; `0` disables it.
    pub max_size_bytes: u64,
    /// Probability, in `[0.0, 1.0]`, that a `Write` triggers a size-cleanup
    /// check. Probabilistic triggering converges to `max_size_bytes`
    /// amortized without a `COUNT(*)` on every write.
    pub cleanup_probability: f64,
}

impl Default for AuditStoreConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
            max_size_bytes: 0,
            cleanup_probability: 0.01,
        }
    }
}

/// Invoked after a size-based cleanup pass with the number of rows
/// actually deleted. Errors during cleanup are logged, not propagated —
/// the write that triggered the check has already committed.
pub type CleanupCallback = Box<dyn Fn(u64) + Send + Sync>;

pub struct AuditEventStore {
    pool: SqlitePool,
    config: AuditStoreConfig,
    on_cleanup: Option<CleanupCallback>,
}

impl AuditEventStore {
    pub async fn open(path: impl AsRef<Path>, config: AuditStoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.operation_timeout);

        // An in-memory database is private to the connection that opened
        // it; a pool of more than one connection would see each writer
        // and reader land on a different empty database. Single-connection
        // pools only make sense for tests, since `max_connections(1)`
        // serializes every caller through one connection.
        let max_connections = if path.to_str() == Some(":memory:") { 1 } else { 8 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(config.operation_timeout)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            config,
            on_cleanup: None,
        };
        store.migrate().await?;
        Ok(store)
    }

    pub fn on_cleanup(mut self, callback: CleanupCallback) -> Self {
        self.on_cleanup = Some(callback);
        self
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                resource_type TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                event_data BLOB NOT NULL,
                actor_email TEXT,
                resource_id TEXT,
                cluster_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_logs_ts ON audit_logs(timestamp_ms)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts one row. With probability `cleanup_probability`, follows up
    /// with a size-based cleanup pass. Bounded by `operation_timeout`.
    pub async fn write(&self, event: &AuditEvent) -> Result<()> {
        let payload = serde_json::to_vec(&event.data)?;
        let actor_email = event.data.actor_email();
        let resource_id = event.resource_id.as_deref().or_else(|| event.data.resource_id());
        let cluster_id = event.data.cluster_id();
        let event_type = event.event_type.to_string();

        let insert = sqlx::query(
            "INSERT INTO audit_logs (event_type, resource_type, timestamp_ms, event_data, actor_email, resource_id, cluster_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event_type)
        .bind(&event.resource_type)
        .bind(event.timestamp_ms)
        .bind(payload)
        .bind(actor_email)
        .bind(resource_id)
        .bind(cluster_id);

        tokio::time::timeout(self.config.operation_timeout, insert.execute(&self.pool))
            .await
            .map_err(|_| AuditError::Timeout(self.config.operation_timeout))??;

        if self.config.max_size_bytes > 0 && rand::thread_rng().gen_bool(self.config.cleanup_probability) {
            if let Err(err) = self.maybe_cleanup_by_size().await {
                // Cleanup failures never fail the write: the insert above
                // already committed.
                tracing::warn!(error = %err, "audit size-based cleanup failed");
            }
        }
        Ok(())
    }

    /// Deletes every row with `timestamp_ms` in `[start_ms, end_ms]`.
    pub async fn remove(&self, start_ms: i64, end_ms: i64) -> Result<u64> {
        let result = tokio::time::timeout(
            self.config.operation_timeout,
            sqlx::query("DELETE FROM audit_logs WHERE timestamp_ms >= ? AND timestamp_ms <= ?")
                .bind(start_ms)
                .bind(end_ms)
                .execute(&self.pool),
        )
        .await
        .map_err(|_| AuditError::Timeout(self.config.operation_timeout))??;
        Ok(result.rows_affected())
    }

    /// `true` iff any row exists.
    pub async fn has_data(&self) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM audit_logs) AS has_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("has_data") != 0)
    }

    /// Forward-only iterator over `[start_ms, end_ms]` ordered by
    /// `(timestamp_ms ASC, id ASC)`.
    pub async fn reader(&self, start_ms: i64, end_ms: i64) -> Result<AuditReader> {
        let rows = sqlx::query(
            "SELECT event_type, resource_type, timestamp_ms, event_data, resource_id
             FROM audit_logs
             WHERE timestamp_ms >= ? AND timestamp_ms <= ?
             ORDER BY timestamp_ms ASC, id ASC",
        )
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event_type: String = row.get("event_type");
            let resource_type: String = row.get("resource_type");
            let timestamp_ms: i64 = row.get("timestamp_ms");
            let payload: Vec<u8> = row.get("event_data");
            let resource_id: Option<String> = row.get("resource_id");
            let data: AuditEventData = serde_json::from_slice(&payload)?;
            events.push(AuditEvent {
                event_type: parse_event_type(&event_type),
                resource_type,
                resource_id,
                timestamp_ms,
                data,
            });
        }
        Ok(AuditReader { events: events.into_iter() })
    }

    /// Fast-path probabilistic size cleanup:
    /// 1. read current table size; return if `<= max_size_bytes`.
    /// 2. estimate `avg_row_size` from `(max_id - min_id + 1)`.
    /// 3. delete the oldest `rows_to_delete` rows by primary key, capped at
    ///    `REMOVE_BY_SIZE_BATCH_CAP`.
    ///
    /// This can overshoot `max_size_bytes` slightly between writes — that
    /// is an accepted tradeoff for avoiding `COUNT(*)` on the hot path.
    async fn maybe_cleanup_by_size(&self) -> Result<()> {
        let page_info = sqlx::query("SELECT page_count, page_size FROM pragma_page_count(), pragma_page_size()")
            .fetch_one(&self.pool)
            .await?;
        let page_count: i64 = page_info.get("page_count");
        let page_size: i64 = page_info.get("page_size");
        let table_size = (page_count * page_size) as u64;

        if table_size <= self.config.max_size_bytes {
            return Ok(());
        }

        let bounds = sqlx::query("SELECT MIN(id) AS min_id, MAX(id) AS max_id FROM audit_logs")
            .fetch_one(&self.pool)
            .await?;
        let min_id: Option<i64> = bounds.get("min_id");
        let max_id: Option<i64> = bounds.get("max_id");
        let (Some(min_id), Some(max_id)) = (min_id, max_id) else {
            return Ok(());
        };

        let row_count = (max_id - min_id + 1).max(1);
        let avg_row_size = (table_size as f64 / row_count as f64).max(1.0);
        let excess = table_size.saturating_sub(self.config.max_size_bytes) as f64;
        let rows_to_delete = (excess / avg_row_size).ceil() as i64;
        let rows_to_delete = rows_to_delete.clamp(1, REMOVE_BY_SIZE_BATCH_CAP).min(row_count);

        let cutoff = min_id + rows_to_delete - 1;
        let result = sqlx::query("DELETE FROM audit_logs WHERE id <= ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        if let Some(callback) = &self.on_cleanup {
            callback(result.rows_affected());
        }
        Ok(())
    }
}

fn parse_event_type(s: &str) -> EventType {
    match s {
        "create" => EventType::Create,
        "update" => EventType::Update,
        "teardown" => EventType::Teardown,
        "destroy" => EventType::Destroy,
        "update_with_conflicts" => EventType::UpdateWithConflicts,
        "k8s_access" => EventType::K8sAccess,
        "talos_access" => EventType::TalosAccess,
        _ => EventType::MigrationParseError,
    }
}

/// Owns a snapshot of the matched rows. The underlying `sqlx` pool
/// connection used to fetch them is released as soon as `reader()`
/// returns, matching the "take on Reader, release on Close" contract
/// without holding a connection open across caller-controlled iteration.
pub struct AuditReader {
    events: std::vec::IntoIter<AuditEvent>,
}

impl Iterator for AuditReader {
    type Item = AuditEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.next()
    }
}
