//! Domain entities shared by every subsystem
//!
//! Every entity carries the id of the organization that owns it. Nothing in
//! the crate reads or counts an entity across that boundary.

pub mod alert;
pub mod api_key;
pub mod log;

pub use alert::{Alert, AlertSeverity, AlertStatus};
pub use api_key::{ApiKey, KeyStatus, KeyType};
pub use log::{AlreadyEnriched, Enrichment, HostMetrics, LogLevel, LogRecord, ProcessRecord};
