//! Multi-tenant telemetry hub
//!
//! Agents publish host and process readings to a broker; the hub normalizes
//! each message into a tenant-owned [`domain::LogRecord`], stores it, raises
//! threshold alerts from it and serves both back through an API-key
//! protected query surface.

pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod query;
pub mod rate_limit;
pub mod storage;
pub mod tenant;

pub use clock::{Clock, MockClock, SystemClock};
