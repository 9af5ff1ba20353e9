//! Threshold alerting over ingested records

pub mod engine;
pub mod error;
pub mod thresholds;
pub mod trends;

pub use engine::{AlertEngine, TREND_PAGE_LIMIT};
pub use error::AlertError;
pub use thresholds::AlertThresholds;
pub use trends::AlertTrends;
