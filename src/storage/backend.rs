//! Repository contracts
//!
//! Every query takes the owning organization id as its leading filter
//! parameter; there is no unscoped read anywhere in these traits. The single
//! exception is [`ApiKeyRepository::get_by_hash`], which is how a request's
//! organization is discovered in the first place.
//!
//! ## Thread Safety
//!
//! Implementations must be `Send + Sync` as they are shared between partition
//! workers and request handlers. Each call is independently atomic; no
//! cross-call transactions are offered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Alert, AlertSeverity, AlertStatus, ApiKey, LogRecord, ProcessRecord};

use super::error::StorageResult;

/// Pagination window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(100, 0)
    }
}

/// Inclusive time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Insert `log` if its id is new
    ///
    /// Returns `false` when the organization already holds a record with this
    /// id; the stored copy is left untouched. An id held by another
    /// organization is a [`StorageError::Conflict`](super::StorageError::Conflict).
    async fn store(&self, log: &LogRecord) -> StorageResult<bool>;

    async fn find_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<LogRecord>>;

    /// Newest first
    async fn list(&self, org_id: &str, page: Page) -> StorageResult<Vec<LogRecord>>;

    /// Records whose timestamp falls in `range`, newest first
    async fn list_by_time_range(
        &self,
        org_id: &str,
        range: TimeRange,
        page: Page,
    ) -> StorageResult<Vec<LogRecord>>;
}

#[async_trait]
pub trait ProcessRepository: Send + Sync {
    /// Insert every process whose id is new; existing rows are kept as they are
    async fn store_batch(&self, processes: &[ProcessRecord]) -> StorageResult<()>;

    async fn find_by_log_id(&self, org_id: &str, log_id: Uuid) -> StorageResult<Vec<ProcessRecord>>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn store(&self, alert: &Alert) -> StorageResult<()>;

    /// Replace an existing alert; returns `false` when no such alert exists
    async fn update(&self, alert: &Alert) -> StorageResult<bool>;

    async fn find_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<Alert>>;

    /// Newest first
    async fn list(&self, org_id: &str, page: Page) -> StorageResult<Vec<Alert>>;

    async fn find_by_status(
        &self,
        org_id: &str,
        status: AlertStatus,
        page: Page,
    ) -> StorageResult<Vec<Alert>>;

    async fn find_by_severity(
        &self,
        org_id: &str,
        severity: AlertSeverity,
        page: Page,
    ) -> StorageResult<Vec<Alert>>;

    async fn find_by_source(&self, org_id: &str, source: &str, page: Page)
    -> StorageResult<Vec<Alert>>;

    /// Alerts created within `range`, newest first
    async fn list_by_time_range(
        &self,
        org_id: &str,
        range: TimeRange,
        page: Page,
    ) -> StorageResult<Vec<Alert>>;

    async fn count_by_status(&self, org_id: &str, status: AlertStatus) -> StorageResult<u64>;

    async fn count_by_severity(&self, org_id: &str, severity: AlertSeverity)
    -> StorageResult<u64>;

    /// Alerts created within `range`
    async fn count_by_time_range(&self, org_id: &str, range: TimeRange) -> StorageResult<u64>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn create(&self, key: &ApiKey) -> StorageResult<()>;

    async fn get_by_hash(&self, key_hash: &str) -> StorageResult<Option<ApiKey>>;

    async fn get_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<ApiKey>>;

    async fn list_by_organization(&self, org_id: &str, page: Page) -> StorageResult<Vec<ApiKey>>;

    async fn update_last_used(&self, org_id: &str, id: Uuid, at: DateTime<Utc>)
    -> StorageResult<()>;

    /// Mark a key revoked; returns `false` when the organization owns no such key
    async fn revoke(&self, org_id: &str, id: Uuid) -> StorageResult<bool>;
}

/// A backend serving every repository contract
#[async_trait]
pub trait StorageBackend:
    LogRepository + ProcessRepository + AlertRepository + ApiKeyRepository
{
    /// Performs a lightweight operation to verify the backend is operational
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}

/// The four repository handles a running hub is wired with
#[derive(Clone)]
pub struct Repositories {
    pub logs: Arc<dyn LogRepository>,
    pub processes: Arc<dyn ProcessRepository>,
    pub alerts: Arc<dyn AlertRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
}

impl Repositories {
    /// Use one backend for every contract
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: StorageBackend + 'static,
    {
        Self {
            logs: backend.clone(),
            processes: backend.clone(),
            alerts: backend.clone(),
            api_keys: backend,
        }
    }
}
