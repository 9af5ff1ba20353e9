//! Ingestion failures

use std::fmt;

use crate::alerts::AlertError;
use crate::storage::StorageError;

/// Why a broker message could not become a record
///
/// Always terminal for the message: it is logged and skipped, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Not a JSON object, or a field with the wrong shape
    MalformedPayload(String),

    /// Missing tenant id, or missing/empty hostname
    InvalidHostFormat(String),

    /// Missing metrics block or non-numeric readings
    InvalidMetricsFormat(String),

    /// `processes` present but not a well-typed object or array
    InvalidProcessesFormat(String),
}

impl IngestError {
    /// Short stable name, used for counters and dead letters
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MalformedPayload(_) => "malformed_payload",
            IngestError::InvalidHostFormat(_) => "invalid_host_format",
            IngestError::InvalidMetricsFormat(_) => "invalid_metrics_format",
            IngestError::InvalidProcessesFormat(_) => "invalid_processes_format",
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::MalformedPayload(msg) => write!(f, "malformed payload: {}", msg),
            IngestError::InvalidHostFormat(msg) => write!(f, "invalid host format: {}", msg),
            IngestError::InvalidMetricsFormat(msg) => write!(f, "invalid metrics format: {}", msg),
            IngestError::InvalidProcessesFormat(msg) => {
                write!(f, "invalid processes format: {}", msg)
            }
        }
    }
}

impl std::error::Error for IngestError {}

/// Failure of one message anywhere in the pipeline
#[derive(Debug)]
pub enum PipelineError {
    Normalize(IngestError),
    Storage(StorageError),
    Alert(AlertError),
}

impl PipelineError {
    /// Rejected before anything was written
    pub fn is_rejection(&self) -> bool {
        matches!(self, PipelineError::Normalize(_))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Normalize(err) => write!(f, "{}", err),
            PipelineError::Storage(err) => write!(f, "{}", err),
            PipelineError::Alert(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Normalize(err) => Some(err),
            PipelineError::Storage(err) => Some(err),
            PipelineError::Alert(err) => Some(err),
        }
    }
}

impl From<IngestError> for PipelineError {
    fn from(err: IngestError) -> Self {
        PipelineError::Normalize(err)
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::Storage(err)
    }
}

impl From<AlertError> for PipelineError {
    fn from(err: AlertError) -> Self {
        PipelineError::Alert(err)
    }
}
