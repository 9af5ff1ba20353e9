//! API shared state

use std::sync::Arc;

use crate::alerts::AlertEngine;
use crate::clock::Clock;
use crate::ingest::IngestPipeline;
use crate::query::LogQueryService;
use crate::rate_limit::SlidingWindowLimiter;
use crate::storage::StorageBackend;
use crate::tenant::TenantAuthority;

/// Shared state passed to all API handlers and middleware
#[derive(Clone)]
pub struct ApiState {
    pub authority: TenantAuthority,
    pub queries: Arc<LogQueryService>,
    pub alerts: Arc<AlertEngine>,
    pub pipeline: Arc<IngestPipeline>,
    pub limiter: Arc<SlidingWindowLimiter>,
    /// For the health endpoint
    pub storage: Arc<dyn StorageBackend>,
    pub clock: Arc<dyn Clock>,
}
