//! In-memory storage backend (no persistence)
//!
//! Serves every repository contract from lock-protected maps. It's useful for:
//! - Testing without database dependencies
//! - Running the hub without a database (`"backend": "none"`)
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Linear scans**: List queries filter the whole tenant's rows

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    Alert, AlertSeverity, AlertStatus, ApiKey, KeyStatus, LogRecord, ProcessRecord,
};

use super::backend::{
    AlertRepository, ApiKeyRepository, HealthStatus, LogRepository, Page, ProcessRepository,
    StorageBackend, TimeRange,
};
use super::error::{StorageError, StorageResult};

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    logs: RwLock<HashMap<Uuid, LogRecord>>,
    processes: RwLock<Vec<ProcessRecord>>,
    alerts: RwLock<HashMap<Uuid, Alert>>,
    api_keys: RwLock<HashMap<Uuid, ApiKey>>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored log records, across all organizations
    pub async fn log_count(&self) -> usize {
        self.logs.read().await.len()
    }

    /// Total number of stored alerts, across all organizations
    pub async fn alert_count(&self) -> usize {
        self.alerts.read().await.len()
    }
}

/// Newest-first slice of `items` according to `page`
fn paginate<T, K>(mut items: Vec<T>, page: Page, key: impl Fn(&T) -> K) -> Vec<T>
where
    K: Ord,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items.into_iter().skip(page.offset).take(page.limit).collect()
}

#[async_trait]
impl LogRepository for MemoryBackend {
    async fn store(&self, log: &LogRecord) -> StorageResult<bool> {
        let mut logs = self.logs.write().await;
        match logs.get(&log.id) {
            Some(existing) if existing.organization_id != log.organization_id => {
                Err(StorageError::Conflict(format!(
                    "log {} belongs to another organization",
                    log.id
                )))
            }
            Some(_) => Ok(false),
            None => {
                logs.insert(log.id, log.clone());
                Ok(true)
            }
        }
    }

    async fn find_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<LogRecord>> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(&id)
            .filter(|log| log.organization_id == org_id)
            .cloned())
    }

    async fn list(&self, org_id: &str, page: Page) -> StorageResult<Vec<LogRecord>> {
        let logs = self.logs.read().await;
        let owned = logs
            .values()
            .filter(|log| log.organization_id == org_id)
            .cloned()
            .collect();
        Ok(paginate(owned, page, |log: &LogRecord| log.timestamp))
    }

    async fn list_by_time_range(
        &self,
        org_id: &str,
        range: TimeRange,
        page: Page,
    ) -> StorageResult<Vec<LogRecord>> {
        debug!("querying in-memory logs for {org_id} between {} and {}", range.start, range.end);
        let logs = self.logs.read().await;
        let owned = logs
            .values()
            .filter(|log| log.organization_id == org_id && range.contains(log.timestamp))
            .cloned()
            .collect();
        Ok(paginate(owned, page, |log: &LogRecord| log.timestamp))
    }
}

#[async_trait]
impl ProcessRepository for MemoryBackend {
    async fn store_batch(&self, processes: &[ProcessRecord]) -> StorageResult<()> {
        if processes.is_empty() {
            return Ok(());
        }
        let mut stored = self.processes.write().await;
        for process in processes {
            if !stored.iter().any(|p| p.id == process.id) {
                stored.push(process.clone());
            }
        }
        Ok(())
    }

    async fn find_by_log_id(&self, org_id: &str, log_id: Uuid) -> StorageResult<Vec<ProcessRecord>> {
        let stored = self.processes.read().await;
        Ok(stored
            .iter()
            .filter(|p| p.organization_id == org_id && p.log_id == log_id)
            .cloned()
            .collect())
    }
}

impl MemoryBackend {
    async fn filter_alerts(
        &self,
        org_id: &str,
        page: Page,
        predicate: impl Fn(&Alert) -> bool,
    ) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        let owned = alerts
            .values()
            .filter(|alert| alert.organization_id == org_id && predicate(alert))
            .cloned()
            .collect();
        paginate(owned, page, |alert: &Alert| alert.created_at)
    }

    async fn count_alerts(&self, org_id: &str, predicate: impl Fn(&Alert) -> bool) -> u64 {
        let alerts = self.alerts.read().await;
        alerts
            .values()
            .filter(|alert| alert.organization_id == org_id && predicate(alert))
            .count() as u64
    }
}

#[async_trait]
impl AlertRepository for MemoryBackend {
    async fn store(&self, alert: &Alert) -> StorageResult<()> {
        let mut alerts = self.alerts.write().await;
        if alerts.contains_key(&alert.id) {
            return Err(StorageError::Conflict(format!("alert {} already exists", alert.id)));
        }
        alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn update(&self, alert: &Alert) -> StorageResult<bool> {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(&alert.id) {
            Some(existing) if existing.organization_id == alert.organization_id => {
                *existing = alert.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<Alert>> {
        let alerts = self.alerts.read().await;
        Ok(alerts
            .get(&id)
            .filter(|alert| alert.organization_id == org_id)
            .cloned())
    }

    async fn list(&self, org_id: &str, page: Page) -> StorageResult<Vec<Alert>> {
        Ok(self.filter_alerts(org_id, page, |_| true).await)
    }

    async fn find_by_status(
        &self,
        org_id: &str,
        status: AlertStatus,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        Ok(self.filter_alerts(org_id, page, |a| a.status == status).await)
    }

    async fn find_by_severity(
        &self,
        org_id: &str,
        severity: AlertSeverity,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        Ok(self.filter_alerts(org_id, page, |a| a.severity == severity).await)
    }

    async fn find_by_source(
        &self,
        org_id: &str,
        source: &str,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        Ok(self.filter_alerts(org_id, page, |a| a.source == source).await)
    }

    async fn list_by_time_range(
        &self,
        org_id: &str,
        range: TimeRange,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        Ok(self
            .filter_alerts(org_id, page, |a| range.contains(a.created_at))
            .await)
    }

    async fn count_by_status(&self, org_id: &str, status: AlertStatus) -> StorageResult<u64> {
        Ok(self.count_alerts(org_id, |a| a.status == status).await)
    }

    async fn count_by_severity(
        &self,
        org_id: &str,
        severity: AlertSeverity,
    ) -> StorageResult<u64> {
        Ok(self.count_alerts(org_id, |a| a.severity == severity).await)
    }

    async fn count_by_time_range(&self, org_id: &str, range: TimeRange) -> StorageResult<u64> {
        Ok(self
            .count_alerts(org_id, |a| range.contains(a.created_at))
            .await)
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryBackend {
    async fn create(&self, key: &ApiKey) -> StorageResult<()> {
        let mut keys = self.api_keys.write().await;
        if keys.values().any(|k| k.id == key.id || k.key_hash == key.key_hash) {
            return Err(StorageError::Conflict(format!("api key {} already exists", key.id)));
        }
        keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn get_by_hash(&self, key_hash: &str) -> StorageResult<Option<ApiKey>> {
        let keys = self.api_keys.read().await;
        Ok(keys.values().find(|k| k.key_hash == key_hash).cloned())
    }

    async fn get_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<ApiKey>> {
        let keys = self.api_keys.read().await;
        Ok(keys
            .get(&id)
            .filter(|k| k.organization_id == org_id)
            .cloned())
    }

    async fn list_by_organization(&self, org_id: &str, page: Page) -> StorageResult<Vec<ApiKey>> {
        let keys = self.api_keys.read().await;
        let owned = keys
            .values()
            .filter(|k| k.organization_id == org_id)
            .cloned()
            .collect();
        Ok(paginate(owned, page, |k: &ApiKey| k.created_at))
    }

    async fn update_last_used(
        &self,
        org_id: &str,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut keys = self.api_keys.write().await;
        if let Some(key) = keys.get_mut(&id).filter(|k| k.organization_id == org_id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn revoke(&self, org_id: &str, id: Uuid) -> StorageResult<bool> {
        let mut keys = self.api_keys.write().await;
        match keys.get_mut(&id) {
            Some(key) if key.organization_id == org_id => {
                key.status = KeyStatus::Revoked;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("logs".to_string(), self.log_count().await.to_string()),
                ("alerts".to_string(), self.alert_count().await.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
