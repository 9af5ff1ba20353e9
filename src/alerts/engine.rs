//! Threshold evaluation and alert lifecycle

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{Alert, AlertSeverity, AlertStatus, LogRecord};
use crate::storage::{AlertRepository, Page, TimeRange};

use super::error::AlertError;
use super::thresholds::AlertThresholds;
use super::trends::AlertTrends;

/// Upper bound on alerts fetched for one trend summary
pub const TREND_PAGE_LIMIT: usize = 1000;

/// Evaluates records against thresholds and owns alert persistence
pub struct AlertEngine {
    alerts: Arc<dyn AlertRepository>,
    clock: Arc<dyn Clock>,
    thresholds: RwLock<AlertThresholds>,
}

impl AlertEngine {
    pub fn new(
        alerts: Arc<dyn AlertRepository>,
        clock: Arc<dyn Clock>,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            alerts,
            clock,
            thresholds: RwLock::new(thresholds),
        }
    }

    pub fn thresholds(&self) -> AlertThresholds {
        *self.thresholds.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the ceilings used by subsequent evaluations
    pub fn set_thresholds(&self, thresholds: AlertThresholds) {
        debug!(?thresholds, "updating alert thresholds");
        *self.thresholds.write().unwrap_or_else(PoisonError::into_inner) = thresholds;
    }

    fn new_alert(
        &self,
        record: &LogRecord,
        title: String,
        description: String,
        severity: AlertSeverity,
        metadata: HashMap<String, Value>,
    ) -> Alert {
        let now = self.clock.now();
        Alert {
            id: Uuid::new_v4(),
            organization_id: record.organization_id.clone(),
            title,
            description,
            severity,
            status: AlertStatus::Open,
            source: record.host.clone(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
            related_logs: vec![record.id],
            metadata,
        }
    }

    /// Alerts `record` would raise under the current thresholds
    ///
    /// CPU and memory breaches are `High`, a process-count breach is `Medium`.
    pub fn evaluate(&self, record: &LogRecord) -> Vec<Alert> {
        let thresholds = self.thresholds();
        let mut alerts = Vec::new();

        let cpu = record.measured_cpu_percent();
        if cpu > thresholds.cpu_percent {
            alerts.push(self.new_alert(
                record,
                format!("High CPU Usage on {}", record.host),
                format!(
                    "CPU usage is {:.2}%, which exceeds the threshold of {:.2}%",
                    cpu, thresholds.cpu_percent
                ),
                AlertSeverity::High,
                HashMap::from([
                    ("cpu_usage".to_string(), json!(cpu)),
                    ("threshold".to_string(), json!(thresholds.cpu_percent)),
                ]),
            ));
        }

        let memory = thresholds.memory_percent_of(record.total_memory_usage);
        if memory > thresholds.memory_percent {
            alerts.push(self.new_alert(
                record,
                format!("High Memory Usage on {}", record.host),
                format!(
                    "Memory usage is {:.2}%, which exceeds the threshold of {:.2}%",
                    memory, thresholds.memory_percent
                ),
                AlertSeverity::High,
                HashMap::from([
                    ("memory_usage".to_string(), json!(memory)),
                    ("threshold".to_string(), json!(thresholds.memory_percent)),
                ]),
            ));
        }

        if record.process_count > thresholds.process_count {
            alerts.push(self.new_alert(
                record,
                format!("High Process Count on {}", record.host),
                format!(
                    "Process count is {}, which exceeds the threshold of {}",
                    record.process_count, thresholds.process_count
                ),
                AlertSeverity::Medium,
                HashMap::from([
                    ("process_count".to_string(), json!(record.process_count)),
                    ("threshold".to_string(), json!(thresholds.process_count)),
                ]),
            ));
        }

        alerts
    }

    /// Evaluate `record` and persist every alert it raises
    ///
    /// Stops at the first failed write; alerts stored before it stay stored.
    #[instrument(skip_all, fields(log_id = %record.id, org = %record.organization_id))]
    pub async fn process_record(&self, record: &LogRecord) -> Result<Vec<Alert>, AlertError> {
        let alerts = self.evaluate(record);

        for alert in &alerts {
            if let Err(e) = self.alerts.store(alert).await {
                warn!(alert_id = %alert.id, "failed to store alert: {}", e);
                return Err(e.into());
            }
            debug!(alert_id = %alert.id, severity = %alert.severity, "alert raised");
        }

        Ok(alerts)
    }

    /// Move an alert to `status`
    ///
    /// Any status may follow any other.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        org_id: &str,
        id: Uuid,
        status: AlertStatus,
    ) -> Result<Alert, AlertError> {
        let mut alert = self.get_alert(org_id, id).await?;
        alert.transition(status, self.clock.now());

        if !self.alerts.update(&alert).await? {
            return Err(AlertError::NotFound(id));
        }
        Ok(alert)
    }

    pub async fn get_alert(&self, org_id: &str, id: Uuid) -> Result<Alert, AlertError> {
        self.alerts
            .find_by_id(org_id, id)
            .await?
            .ok_or(AlertError::NotFound(id))
    }

    pub async fn list_alerts(&self, org_id: &str, page: Page) -> Result<Vec<Alert>, AlertError> {
        Ok(self.alerts.list(org_id, page).await?)
    }

    pub async fn list_by_status(
        &self,
        org_id: &str,
        status: AlertStatus,
        page: Page,
    ) -> Result<Vec<Alert>, AlertError> {
        Ok(self.alerts.find_by_status(org_id, status, page).await?)
    }

    pub async fn list_by_severity(
        &self,
        org_id: &str,
        severity: AlertSeverity,
        page: Page,
    ) -> Result<Vec<Alert>, AlertError> {
        Ok(self.alerts.find_by_severity(org_id, severity, page).await?)
    }

    pub async fn list_by_source(
        &self,
        org_id: &str,
        source: &str,
        page: Page,
    ) -> Result<Vec<Alert>, AlertError> {
        Ok(self.alerts.find_by_source(org_id, source, page).await?)
    }

    pub async fn list_by_time_range(
        &self,
        org_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: Page,
    ) -> Result<Vec<Alert>, AlertError> {
        let range = TimeRange { start, end };
        Ok(self.alerts.list_by_time_range(org_id, range, page).await?)
    }

    pub async fn count_by_status(
        &self,
        org_id: &str,
        status: AlertStatus,
    ) -> Result<u64, AlertError> {
        Ok(self.alerts.count_by_status(org_id, status).await?)
    }

    pub async fn count_by_severity(
        &self,
        org_id: &str,
        severity: AlertSeverity,
    ) -> Result<u64, AlertError> {
        Ok(self.alerts.count_by_severity(org_id, severity).await?)
    }

    /// Alerts created in `[start, end]`, without the trend page bound
    pub async fn count_by_time_range(
        &self,
        org_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, AlertError> {
        let range = TimeRange { start, end };
        Ok(self.alerts.count_by_time_range(org_id, range).await?)
    }

    /// Summarize alerts created in `[start, end]`, at most [`TREND_PAGE_LIMIT`] of them
    #[instrument(skip(self))]
    pub async fn get_trends(
        &self,
        org_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AlertTrends, AlertError> {
        let alerts = self
            .list_by_time_range(org_id, start, end, Page::new(TREND_PAGE_LIMIT, 0))
            .await?;

        if alerts.len() == TREND_PAGE_LIMIT {
            warn!("trend window hit the page bound, summary is truncated");
        }

        Ok(AlertTrends::summarize(start, end, &alerts))
    }
}
