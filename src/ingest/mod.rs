//! Broker-side ingestion: normalization, the per-message pipeline and the
//! partitioned consumer that drives it

pub mod consumer;
pub mod error;
pub mod normalizer;
pub mod pipeline;

pub use consumer::{Consumer, ConsumerHandle, ConsumerStats, ConsumerStatsSnapshot, DeadLetter};
pub use error::{IngestError, PipelineError};
pub use normalizer::{BrokerMessage, Coordinates, Normalized, Normalizer, record_id};
pub use pipeline::{IngestOutcome, IngestPipeline, RetryPolicy};
