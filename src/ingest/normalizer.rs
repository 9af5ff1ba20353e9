//! Broker message → [`LogRecord`]
//!
//! The payload is parsed into a `serde_json::Value` first and each field is
//! checked explicitly before anything typed is built. Accepted shape:
//!
//! ```text
//! {
//!   "tenant_id": "acme",                       required, non-empty
//!   "host": { "hostname": "h1", ... },         required, non-empty hostname
//!   "metrics": { "cpu_usage": 95.0,            required object, readings optional
//!                "memory_usage_percent": 40.0 },
//!   "processes": { "total_count", "total_cpu_percent", "total_memory_usage",
//!                  "list": [ process, ... ] }
//!              | [ process, ... ] | null,      optional
//!   "metadata": { ... },                       optional object
//!   "threat_indicators": [ ... ],              optional, kept in metadata
//!   "level": "warn", "message": "..."          optional
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{HostMetrics, LogLevel, LogRecord, ProcessRecord};

use super::error::IngestError;

/// Namespace for record ids derived from broker coordinates
const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1e_0b7a_52c4_4d3e_9a61_2b8f_c0d4_17e5);

/// Where a message sits in the broker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinates {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.topic, self.partition, self.offset)
    }
}

/// One delivery from the broker
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    /// `None` for messages built outside a broker
    pub coordinates: Option<Coordinates>,
    /// Delivery timestamp
    pub timestamp: Option<DateTime<Utc>>,
}

impl BrokerMessage {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key: None,
            value: value.into(),
            coordinates: Some(Coordinates {
                topic: topic.into(),
                partition,
                offset,
            }),
            timestamp: None,
        }
    }

    /// A message with no broker coordinates
    pub fn synthetic(value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: None,
            value: value.into(),
            coordinates: None,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn partition(&self) -> Option<i32> {
        self.coordinates.as_ref().map(|c| c.partition)
    }
}

/// A validated record and the process rows that arrived with it
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: LogRecord,
    pub processes: Vec<ProcessRecord>,
}

/// Stateless apart from the clock; safe to share between partition workers
#[derive(Debug, Clone)]
pub struct Normalizer {
    clock: Arc<dyn Clock>,
}

/// Record id for a message: stable across redelivery when coordinates exist
pub fn record_id(coordinates: Option<&Coordinates>) -> Uuid {
    match coordinates {
        Some(c) => Uuid::new_v5(&RECORD_ID_NAMESPACE, c.to_string().as_bytes()),
        None => Uuid::new_v4(),
    }
}

fn non_negative_integer(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}

struct ProcessBlock {
    total_count: u64,
    total_cpu_percent: f64,
    total_memory_usage: u64,
    list: Vec<ParsedProcess>,
}

struct ParsedProcess {
    name: String,
    pid: u32,
    cpu_percent: f64,
    memory_usage: u64,
    status: String,
}

impl Normalizer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Turn one message into exactly one record, or say why not
    pub fn normalize(&self, message: &BrokerMessage) -> Result<Normalized, IngestError> {
        let document: Value = serde_json::from_slice(&message.value)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;

        let Value::Object(fields) = document else {
            return Err(IngestError::MalformedPayload(
                "payload is not a JSON object".to_string(),
            ));
        };

        let organization_id = Self::tenant_id(&fields)?;
        let host = Self::hostname(&fields)?;
        let host_metrics = Self::metrics(&fields)?;
        let processes = Self::processes(&fields)?;
        let metadata = Self::metadata(&fields)?;

        let timestamp = message.timestamp.unwrap_or_else(|| self.clock.now());
        let id = record_id(message.coordinates.as_ref());

        let mut record = LogRecord::new(id, organization_id, host, timestamp);
        record.level = Self::level(&fields);
        record.message = match fields.get("message").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => format!(
                "CPU Usage: {:.2}%, Memory Usage: {:.2}%",
                host_metrics.cpu_usage, host_metrics.memory_usage_percent
            ),
        };
        record.metadata = metadata;
        record.host_metrics = host_metrics;

        let mut process_rows = Vec::new();
        if let Some(block) = processes {
            record.process_count = block.total_count;
            record.total_cpu_percent = block.total_cpu_percent;
            record.total_memory_usage = block.total_memory_usage;

            process_rows = block
                .list
                .into_iter()
                .enumerate()
                .map(|(index, p)| ProcessRecord {
                    id: Uuid::new_v5(&record.id, index.to_string().as_bytes()),
                    log_id: record.id,
                    organization_id: record.organization_id.clone(),
                    name: p.name,
                    pid: p.pid,
                    cpu_percent: p.cpu_percent,
                    memory_usage: p.memory_usage,
                    status: p.status,
                    timestamp,
                })
                .collect();
        }

        Ok(Normalized {
            record,
            processes: process_rows,
        })
    }

    fn tenant_id(fields: &Map<String, Value>) -> Result<String, IngestError> {
        match fields.get("tenant_id").and_then(Value::as_str) {
            Some(tenant) if !tenant.trim().is_empty() => Ok(tenant.to_string()),
            _ => Err(IngestError::InvalidHostFormat(
                "missing tenant_id".to_string(),
            )),
        }
    }

    fn hostname(fields: &Map<String, Value>) -> Result<String, IngestError> {
        let host = fields
            .get("host")
            .and_then(Value::as_object)
            .ok_or_else(|| IngestError::InvalidHostFormat("missing host object".to_string()))?;

        match host.get("hostname").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => Ok(name.to_string()),
            _ => Err(IngestError::InvalidHostFormat(
                "missing or empty hostname".to_string(),
            )),
        }
    }

    fn metrics(fields: &Map<String, Value>) -> Result<HostMetrics, IngestError> {
        let metrics = fields
            .get("metrics")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                IngestError::InvalidMetricsFormat("missing metrics object".to_string())
            })?;

        let reading = |name: &str| -> Result<f64, IngestError> {
            match metrics.get(name) {
                None | Some(Value::Null) => Ok(0.0),
                Some(value) => value.as_f64().ok_or_else(|| {
                    IngestError::InvalidMetricsFormat(format!("{name} is not a number"))
                }),
            }
        };

        Ok(HostMetrics {
            cpu_usage: reading("cpu_usage")?,
            memory_usage_percent: reading("memory_usage_percent")?,
        })
    }

    fn processes(fields: &Map<String, Value>) -> Result<Option<ProcessBlock>, IngestError> {
        match fields.get("processes") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => {
                let list = Self::process_list(items)?;
                Ok(Some(Self::derived_totals(list)))
            }
            Some(Value::Object(block)) => {
                let list = match block.get("list") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => Self::process_list(items)?,
                    Some(_) => {
                        return Err(IngestError::InvalidProcessesFormat(
                            "list is not an array".to_string(),
                        ));
                    }
                };

                let derived = Self::derived_totals(list);
                let total = |name: &str| -> Result<Option<&Value>, IngestError> {
                    match block.get(name) {
                        None | Some(Value::Null) => Ok(None),
                        Some(value) if value.is_number() => Ok(Some(value)),
                        Some(_) => Err(IngestError::InvalidProcessesFormat(format!(
                            "{name} is not a number"
                        ))),
                    }
                };

                let total_count = match total("total_count")? {
                    Some(v) => non_negative_integer(v).ok_or_else(|| {
                        IngestError::InvalidProcessesFormat("negative total_count".to_string())
                    })?,
                    None => derived.total_count,
                };
                let total_cpu_percent = match total("total_cpu_percent")? {
                    Some(v) => v.as_f64().unwrap_or_default(),
                    None => derived.total_cpu_percent,
                };
                let total_memory_usage = match total("total_memory_usage")? {
                    Some(v) => non_negative_integer(v).ok_or_else(|| {
                        IngestError::InvalidProcessesFormat(
                            "negative total_memory_usage".to_string(),
                        )
                    })?,
                    None => derived.total_memory_usage,
                };

                Ok(Some(ProcessBlock {
                    total_count,
                    total_cpu_percent,
                    total_memory_usage,
                    list: derived.list,
                }))
            }
            Some(_) => Err(IngestError::InvalidProcessesFormat(
                "processes must be an object or an array".to_string(),
            )),
        }
    }

    fn derived_totals(list: Vec<ParsedProcess>) -> ProcessBlock {
        ProcessBlock {
            total_count: list.len() as u64,
            total_cpu_percent: list.iter().map(|p| p.cpu_percent).sum(),
            total_memory_usage: list.iter().map(|p| p.memory_usage).sum(),
            list,
        }
    }

    fn process_list(items: &[Value]) -> Result<Vec<ParsedProcess>, IngestError> {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                Self::process(item).ok_or_else(|| {
                    IngestError::InvalidProcessesFormat(format!(
                        "process entry {index} is not a well-typed process"
                    ))
                })
            })
            .collect()
    }

    fn process(item: &Value) -> Option<ParsedProcess> {
        let fields = item.as_object()?;

        let name = fields.get("name")?.as_str()?.to_string();
        let pid = u32::try_from(fields.get("pid")?.as_u64()?).ok()?;

        let cpu_percent = match fields.get("cpu_percent") {
            None | Some(Value::Null) => 0.0,
            Some(v) => v.as_f64()?,
        };
        let memory_usage = match fields.get("memory_usage") {
            None | Some(Value::Null) => 0,
            Some(v) => non_negative_integer(v)?,
        };
        let status = match fields.get("status") {
            None | Some(Value::Null) => "unknown".to_string(),
            Some(v) => v.as_str()?.to_string(),
        };

        Some(ParsedProcess {
            name,
            pid,
            cpu_percent,
            memory_usage,
            status,
        })
    }

    fn metadata(fields: &Map<String, Value>) -> Result<HashMap<String, Value>, IngestError> {
        let mut metadata: HashMap<String, Value> = match fields.get("metadata") {
            None | Some(Value::Null) => HashMap::new(),
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            Some(_) => {
                return Err(IngestError::MalformedPayload(
                    "metadata must be an object".to_string(),
                ));
            }
        };

        if let Some(indicators) = fields.get("threat_indicators").filter(|v| !v.is_null()) {
            metadata.insert("threat_indicators".to_string(), indicators.clone());
        }

        Ok(metadata)
    }

    fn level(fields: &Map<String, Value>) -> LogLevel {
        fields
            .get("level")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(LogLevel::lowest)
    }
}
