//! Trend summaries over a window of alerts

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::Alert;

/// Counts over the alerts created inside `[start, end]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertTrends {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    /// Keyed by hour of creation, `"HH:00"` (UTC)
    pub time_distribution: BTreeMap<String, usize>,
}

impl AlertTrends {
    /// Single pass over `alerts`
    pub fn summarize(start: DateTime<Utc>, end: DateTime<Utc>, alerts: &[Alert]) -> Self {
        let mut trends = AlertTrends {
            start: Some(start),
            end: Some(end),
            total: alerts.len(),
            ..Default::default()
        };

        for alert in alerts {
            *trends
                .by_severity
                .entry(alert.severity.as_str().to_string())
                .or_default() += 1;
            *trends
                .by_status
                .entry(alert.status.as_str().to_string())
                .or_default() += 1;
            *trends.by_source.entry(alert.source.clone()).or_default() += 1;
            *trends
                .time_distribution
                .entry(alert.created_at.format("%H:00").to_string())
                .or_default() += 1;
        }

        trends
    }
}
