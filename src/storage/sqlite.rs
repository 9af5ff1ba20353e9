//! SQLite storage backend implementation
//!
//! Embedded, file-backed implementation of every repository contract.
//!
//! ## Features
//!
//! - **WAL mode**: readers are not blocked by the ingest writers
//! - **Connection pooling**: one pool shared by partition workers and handlers
//! - **Migrations**: schema versioned under `migrations/` and applied on open
//!
//! Timestamps are stored as Unix milliseconds; metadata, tags and related log
//! lists are stored as JSON text.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    Alert, AlertSeverity, AlertStatus, ApiKey, HostMetrics, KeyStatus, LogRecord, ProcessRecord,
};

use super::backend::{
    AlertRepository, ApiKeyRepository, HealthStatus, LogRepository, Page, ProcessRepository,
    StorageBackend, TimeRange,
};
use super::error::{StorageError, StorageResult};

const LOG_COLUMNS: &str = "id, organization_id, timestamp, host, message, level, metadata, \
     cpu_usage, memory_usage_pct, process_count, total_cpu_percent, total_memory_usage, \
     environment, application, component, correlation_id, tags, enriched_at";

const ALERT_COLUMNS: &str = "id, organization_id, title, description, severity, status, source, \
     created_at, updated_at, resolved_at, related_logs, metadata";

const KEY_COLUMNS: &str = "id, organization_id, key_type, key_hash, name, created_at, expires_at, \
     last_used_at, status, permissions";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database file and apply pending migrations
    ///
    /// ```no_run
    /// # use fleetlog::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./fleetlog.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn parse_uuid(raw: &str) -> StorageResult<Uuid> {
        Uuid::parse_str(raw)
            .map_err(|e| StorageError::SerializationError(format!("invalid uuid {raw}: {e}")))
    }

    fn parse_enum<T: std::str::FromStr<Err = String>>(raw: &str) -> StorageResult<T> {
        raw.parse::<T>().map_err(StorageError::SerializationError)
    }

    fn log_from_row(row: &SqliteRow) -> StorageResult<LogRecord> {
        let id: String = row.try_get("id")?;
        let level: String = row.try_get("level")?;
        let metadata: String = row.try_get("metadata")?;
        let tags: String = row.try_get("tags")?;
        let correlation_id: Option<String> = row.try_get("correlation_id")?;
        let enriched_at: Option<i64> = row.try_get("enriched_at")?;

        Ok(LogRecord {
            id: Self::parse_uuid(&id)?,
            organization_id: row.try_get("organization_id")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
            host: row.try_get("host")?,
            message: row.try_get("message")?,
            level: Self::parse_enum(&level)?,
            metadata: serde_json::from_str(&metadata)?,
            host_metrics: HostMetrics {
                cpu_usage: row.try_get("cpu_usage")?,
                memory_usage_percent: row.try_get("memory_usage_pct")?,
            },
            process_count: row.try_get::<i64, _>("process_count")? as u64,
            total_cpu_percent: row.try_get("total_cpu_percent")?,
            total_memory_usage: row.try_get::<i64, _>("total_memory_usage")? as u64,
            environment: row.try_get("environment")?,
            application: row.try_get("application")?,
            component: row.try_get("component")?,
            correlation_id: correlation_id.as_deref().map(Self::parse_uuid).transpose()?,
            tags: serde_json::from_str(&tags)?,
            enriched_at: enriched_at.map(Self::millis_to_timestamp),
        })
    }

    fn process_from_row(row: &SqliteRow) -> StorageResult<ProcessRecord> {
        let id: String = row.try_get("id")?;
        let log_id: String = row.try_get("log_id")?;

        Ok(ProcessRecord {
            id: Self::parse_uuid(&id)?,
            log_id: Self::parse_uuid(&log_id)?,
            organization_id: row.try_get("organization_id")?,
            name: row.try_get("name")?,
            pid: row.try_get::<i64, _>("pid")? as u32,
            cpu_percent: row.try_get("cpu_percent")?,
            memory_usage: row.try_get::<i64, _>("memory_usage")? as u64,
            status: row.try_get("status")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<Alert> {
        let id: String = row.try_get("id")?;
        let severity: String = row.try_get("severity")?;
        let status: String = row.try_get("status")?;
        let resolved_at: Option<i64> = row.try_get("resolved_at")?;
        let related_logs: String = row.try_get("related_logs")?;
        let metadata: String = row.try_get("metadata")?;

        Ok(Alert {
            id: Self::parse_uuid(&id)?,
            organization_id: row.try_get("organization_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            severity: Self::parse_enum(&severity)?,
            status: Self::parse_enum(&status)?,
            source: row.try_get("source")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
            updated_at: Self::millis_to_timestamp(row.try_get("updated_at")?),
            resolved_at: resolved_at.map(Self::millis_to_timestamp),
            related_logs: serde_json::from_str(&related_logs)?,
            metadata: serde_json::from_str::<HashMap<String, Value>>(&metadata)?,
        })
    }

    fn key_from_row(row: &SqliteRow) -> StorageResult<ApiKey> {
        let id: String = row.try_get("id")?;
        let key_type: String = row.try_get("key_type")?;
        let status: String = row.try_get("status")?;
        let expires_at: Option<i64> = row.try_get("expires_at")?;
        let last_used_at: Option<i64> = row.try_get("last_used_at")?;
        let permissions: String = row.try_get("permissions")?;

        Ok(ApiKey {
            id: Self::parse_uuid(&id)?,
            organization_id: row.try_get("organization_id")?,
            key_type: Self::parse_enum(&key_type)?,
            key_hash: row.try_get("key_hash")?,
            name: row.try_get("name")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
            expires_at: expires_at.map(Self::millis_to_timestamp),
            last_used_at: last_used_at.map(Self::millis_to_timestamp),
            status: Self::parse_enum(&status)?,
            permissions: serde_json::from_str(&permissions)?,
        })
    }

    /// Run an organization-scoped alert query with one extra equality filter
    async fn alerts_where(
        &self,
        org_id: &str,
        column: &str,
        value: &str,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE organization_id = ? AND {column} = ? \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(org_id)
            .bind(value)
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn count_alerts_where(
        &self,
        org_id: &str,
        column: &str,
        value: &str,
    ) -> StorageResult<u64> {
        let sql =
            format!("SELECT COUNT(*) FROM alerts WHERE organization_id = ? AND {column} = ?");

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(org_id)
            .bind(value)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}

#[async_trait]
impl LogRepository for SqliteBackend {
    #[instrument(skip(self, log), fields(log_id = %log.id, org = %log.organization_id))]
    async fn store(&self, log: &LogRecord) -> StorageResult<bool> {
        let metadata = serde_json::to_string(&log.metadata)?;
        let tags = serde_json::to_string(&log.tags)?;

        let result = sqlx::query(
            r#"
            INSERT INTO logs (
                id, organization_id, timestamp, host, message, level, metadata,
                cpu_usage, memory_usage_pct, process_count, total_cpu_percent,
                total_memory_usage, environment, application, component,
                correlation_id, tags, enriched_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(log.id.to_string())
        .bind(&log.organization_id)
        .bind(Self::timestamp_to_millis(&log.timestamp))
        .bind(&log.host)
        .bind(&log.message)
        .bind(log.level.as_str())
        .bind(metadata)
        .bind(log.host_metrics.cpu_usage)
        .bind(log.host_metrics.memory_usage_percent)
        .bind(log.process_count as i64)
        .bind(log.total_cpu_percent)
        .bind(log.total_memory_usage as i64)
        .bind(log.environment.as_deref())
        .bind(log.application.as_deref())
        .bind(log.component.as_deref())
        .bind(log.correlation_id.map(|id| id.to_string()))
        .bind(tags)
        .bind(log.enriched_at.as_ref().map(Self::timestamp_to_millis))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!("log stored");
            return Ok(true);
        }

        let owner: Option<String> =
            sqlx::query_scalar("SELECT organization_id FROM logs WHERE id = ?")
                .bind(log.id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match owner {
            Some(owner) if owner != log.organization_id => {
                warn!("log id already owned by another organization");
                Err(StorageError::Conflict(format!(
                    "log {} belongs to another organization",
                    log.id
                )))
            }
            _ => {
                debug!("log already stored, keeping the existing row");
                Ok(false)
            }
        }
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<LogRecord>> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM logs WHERE organization_id = ? AND id = ?");

        let row = sqlx::query(&sql)
            .bind(org_id)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::log_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, org_id: &str, page: Page) -> StorageResult<Vec<LogRecord>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM logs WHERE organization_id = ? \
             ORDER BY timestamp DESC LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(org_id)
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::log_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_by_time_range(
        &self,
        org_id: &str,
        range: TimeRange,
        page: Page,
    ) -> StorageResult<Vec<LogRecord>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM logs \
             WHERE organization_id = ? AND timestamp >= ? AND timestamp <= ? \
             ORDER BY timestamp DESC LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(org_id)
            .bind(Self::timestamp_to_millis(&range.start))
            .bind(Self::timestamp_to_millis(&range.end))
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::log_from_row).collect()
    }
}

#[async_trait]
impl ProcessRepository for SqliteBackend {
    #[instrument(skip(self, processes), fields(count = processes.len()))]
    async fn store_batch(&self, processes: &[ProcessRecord]) -> StorageResult<()> {
        if processes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for process in processes {
            sqlx::query(
                r#"
                INSERT INTO processes (
                    id, log_id, organization_id, name, pid,
                    cpu_percent, memory_usage, status, timestamp
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(process.id.to_string())
            .bind(process.log_id.to_string())
            .bind(&process.organization_id)
            .bind(&process.name)
            .bind(process.pid as i64)
            .bind(process.cpu_percent)
            .bind(process.memory_usage as i64)
            .bind(&process.status)
            .bind(Self::timestamp_to_millis(&process.timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("process batch stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_log_id(&self, org_id: &str, log_id: Uuid) -> StorageResult<Vec<ProcessRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, log_id, organization_id, name, pid,
                   cpu_percent, memory_usage, status, timestamp
            FROM processes
            WHERE organization_id = ? AND log_id = ?
            ORDER BY pid ASC
            "#,
        )
        .bind(org_id)
        .bind(log_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::process_from_row).collect()
    }
}

#[async_trait]
impl AlertRepository for SqliteBackend {
    #[instrument(skip(self, alert), fields(alert_id = %alert.id, org = %alert.organization_id))]
    async fn store(&self, alert: &Alert) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, organization_id, title, description, severity, status, source,
                created_at, updated_at, resolved_at, related_logs, metadata
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.id.to_string())
        .bind(&alert.organization_id)
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(alert.severity.as_str())
        .bind(alert.status.as_str())
        .bind(&alert.source)
        .bind(Self::timestamp_to_millis(&alert.created_at))
        .bind(Self::timestamp_to_millis(&alert.updated_at))
        .bind(alert.resolved_at.as_ref().map(Self::timestamp_to_millis))
        .bind(serde_json::to_string(&alert.related_logs)?)
        .bind(serde_json::to_string(&alert.metadata)?)
        .execute(&self.pool)
        .await?;

        debug!("alert stored");
        Ok(())
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id, status = %alert.status))]
    async fn update(&self, alert: &Alert) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts SET
                title = ?, description = ?, severity = ?, status = ?, source = ?,
                updated_at = ?, resolved_at = ?, related_logs = ?, metadata = ?
            WHERE organization_id = ? AND id = ?
            "#,
        )
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(alert.severity.as_str())
        .bind(alert.status.as_str())
        .bind(&alert.source)
        .bind(Self::timestamp_to_millis(&alert.updated_at))
        .bind(alert.resolved_at.as_ref().map(Self::timestamp_to_millis))
        .bind(serde_json::to_string(&alert.related_logs)?)
        .bind(serde_json::to_string(&alert.metadata)?)
        .bind(&alert.organization_id)
        .bind(alert.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<Alert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE organization_id = ? AND id = ?");

        let row = sqlx::query(&sql)
            .bind(org_id)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::alert_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, org_id: &str, page: Page) -> StorageResult<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE organization_id = ? \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(org_id)
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn find_by_status(
        &self,
        org_id: &str,
        status: AlertStatus,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        self.alerts_where(org_id, "status", status.as_str(), page).await
    }

    async fn find_by_severity(
        &self,
        org_id: &str,
        severity: AlertSeverity,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        self.alerts_where(org_id, "severity", severity.as_str(), page)
            .await
    }

    async fn find_by_source(
        &self,
        org_id: &str,
        source: &str,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        self.alerts_where(org_id, "source", source, page).await
    }

    #[instrument(skip(self))]
    async fn list_by_time_range(
        &self,
        org_id: &str,
        range: TimeRange,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE organization_id = ? AND created_at >= ? AND created_at <= ? \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(org_id)
            .bind(Self::timestamp_to_millis(&range.start))
            .bind(Self::timestamp_to_millis(&range.end))
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn count_by_status(&self, org_id: &str, status: AlertStatus) -> StorageResult<u64> {
        self.count_alerts_where(org_id, "status", status.as_str()).await
    }

    async fn count_by_severity(
        &self,
        org_id: &str,
        severity: AlertSeverity,
    ) -> StorageResult<u64> {
        self.count_alerts_where(org_id, "severity", severity.as_str())
            .await
    }

    #[instrument(skip(self))]
    async fn count_by_time_range(&self, org_id: &str, range: TimeRange) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM alerts \
             WHERE organization_id = ? AND created_at >= ? AND created_at <= ?",
        )
        .bind(org_id)
        .bind(Self::timestamp_to_millis(&range.start))
        .bind(Self::timestamp_to_millis(&range.end))
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }
}

#[async_trait]
impl ApiKeyRepository for SqliteBackend {
    #[instrument(skip(self, key), fields(key_id = %key.id, org = %key.organization_id))]
    async fn create(&self, key: &ApiKey) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (
                id, organization_id, key_type, key_hash, name, created_at,
                expires_at, last_used_at, status, permissions
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.id.to_string())
        .bind(&key.organization_id)
        .bind(key.key_type.as_str())
        .bind(&key.key_hash)
        .bind(&key.name)
        .bind(Self::timestamp_to_millis(&key.created_at))
        .bind(key.expires_at.as_ref().map(Self::timestamp_to_millis))
        .bind(key.last_used_at.as_ref().map(Self::timestamp_to_millis))
        .bind(key.status.as_str())
        .bind(serde_json::to_string(&key.permissions)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_hash(&self, key_hash: &str) -> StorageResult<Option<ApiKey>> {
        let sql = format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE key_hash = ?");

        let row = sqlx::query(&sql)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::key_from_row).transpose()
    }

    async fn get_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<ApiKey>> {
        let sql =
            format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE organization_id = ? AND id = ?");

        let row = sqlx::query(&sql)
            .bind(org_id)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::key_from_row).transpose()
    }

    async fn list_by_organization(&self, org_id: &str, page: Page) -> StorageResult<Vec<ApiKey>> {
        let sql = format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE organization_id = ? \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(org_id)
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::key_from_row).collect()
    }

    async fn update_last_used(
        &self,
        org_id: &str,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE organization_id = ? AND id = ?")
            .bind(Self::timestamp_to_millis(&at))
            .bind(org_id)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn revoke(&self, org_id: &str, id: Uuid) -> StorageResult<bool> {
        let result =
            sqlx::query("UPDATE api_keys SET status = ? WHERE organization_id = ? AND id = ?")
                .bind(KeyStatus::Revoked.as_str())
                .bind(org_id)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let result = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("path".to_string(), self.db_path.clone());
                metadata.insert("pool_size".to_string(), self.pool.size().to_string());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("SQLite health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("SQLite health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite connection pool");
        self.pool.close().await;
        Ok(())
    }
}
