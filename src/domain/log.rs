//! Log records and the per-process rows derived from them

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Severity of a log record
///
/// Ordered from lowest to highest; `Info` is what unspecified levels
/// normalize to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub const fn lowest() -> Self {
        LogLevel::Info
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::lowest()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" | "DEBUG" | "TRACE" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Host-level readings reported in the `metrics` block of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMetrics {
    /// Overall CPU usage of the host (percentage 0-100)
    pub cpu_usage: f64,

    /// Overall memory usage of the host (percentage 0-100)
    pub memory_usage_percent: f64,
}

/// Environment details attached to a record by the enrichment step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub environment: String,
    pub application: String,
    pub component: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Returned when enrichment is applied to an already enriched record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlreadyEnriched {
    pub log_id: Uuid,
}

impl fmt::Display for AlreadyEnriched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "log {} has already been enriched", self.log_id)
    }
}

impl std::error::Error for AlreadyEnriched {}

/// A tenant-scoped telemetry unit
///
/// Immutable after normalization except for the enrichment fields, which
/// [`LogRecord::enrich`] sets at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: Uuid,
    pub organization_id: String,
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub message: String,
    pub level: LogLevel,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    #[serde(default)]
    pub host_metrics: HostMetrics,

    // === Process aggregates ===
    pub process_count: u64,
    pub total_cpu_percent: f64,
    pub total_memory_usage: u64,

    // === Enrichment (set once) ===
    pub environment: Option<String>,
    pub application: Option<String>,
    pub component: Option<String>,
    pub correlation_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub enriched_at: Option<DateTime<Utc>>,
}

impl LogRecord {
    /// Create an unenriched record with zeroed aggregates
    pub fn new(
        id: Uuid,
        organization_id: impl Into<String>,
        host: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            organization_id: organization_id.into(),
            timestamp,
            host: host.into(),
            message: String::new(),
            level: LogLevel::lowest(),
            metadata: HashMap::new(),
            host_metrics: HostMetrics::default(),
            process_count: 0,
            total_cpu_percent: 0.0,
            total_memory_usage: 0,
            environment: None,
            application: None,
            component: None,
            correlation_id: None,
            tags: Vec::new(),
            enriched_at: None,
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.enriched_at.is_some()
    }

    /// Attach environment details and a fresh correlation id
    pub fn enrich(&mut self, enrichment: &Enrichment, at: DateTime<Utc>) -> Result<(), AlreadyEnriched> {
        if self.is_enriched() {
            return Err(AlreadyEnriched { log_id: self.id });
        }

        self.environment = Some(enrichment.environment.clone());
        self.application = Some(enrichment.application.clone());
        self.component = Some(enrichment.component.clone());
        self.correlation_id = Some(Uuid::new_v4());
        self.tags = enrichment.tags.clone();
        self.enriched_at = Some(at);
        Ok(())
    }

    /// CPU reading used for threshold checks
    ///
    /// The greater of the host-reported usage and the process aggregate, so
    /// agents that omit the process block are still evaluated.
    pub fn measured_cpu_percent(&self) -> f64 {
        self.total_cpu_percent.max(self.host_metrics.cpu_usage)
    }
}

/// A single process observed on a host, tied to the record it arrived with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub id: Uuid,
    pub log_id: Uuid,
    pub organization_id: String,
    pub name: String,
    pub pid: u32,
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
