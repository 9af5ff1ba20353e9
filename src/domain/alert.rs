//! Alerts derived from threshold breaches

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub const ALL: [AlertSeverity; 4] = [
        AlertSeverity::Low,
        AlertSeverity::Medium,
        AlertSeverity::High,
        AlertSeverity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(AlertSeverity::Low),
            "MEDIUM" => Ok(AlertSeverity::Medium),
            "HIGH" => Ok(AlertSeverity::High),
            "CRITICAL" => Ok(AlertSeverity::Critical),
            other => Err(format!("unknown alert severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    Open,
    Resolved,
    Ignored,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 3] = [
        AlertStatus::Open,
        AlertStatus::Resolved,
        AlertStatus::Ignored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "OPEN",
            AlertStatus::Resolved => "RESOLVED",
            AlertStatus::Ignored => "IGNORED",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(AlertStatus::Open),
            "RESOLVED" => Ok(AlertStatus::Resolved),
            "IGNORED" => Ok(AlertStatus::Ignored),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

/// A finding raised when a record breaches a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub organization_id: String,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,

    /// Usually the host that produced the breaching record
    pub source: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub related_logs: Vec<Uuid>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Alert {
    /// Apply a status change at `now`
    ///
    /// Moving to `Resolved` stamps `resolved_at`; no other transition touches
    /// it, so re-opening a resolved alert keeps its resolution time.
    pub fn transition(&mut self, status: AlertStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        if status == AlertStatus::Resolved {
            self.resolved_at = Some(now);
        }
    }
}
