//! Per-message handling: normalize, enrich, persist, alert
//!
//! ## Message Flow
//!
//! ```text
//! BrokerMessage → Normalizer → enrich (once) → LogRepository::store (retried)
//!               → ProcessRepository::store_batch (retried)
//!               → LogQueryService::invalidate(org)
//!               → AlertEngine::process_record → AlertRepository::store
//! ```
//!
//! Writes are retried with a linear backoff; conflicts are not retried.
//!
//! A record is written once. When its id is already stored (a redelivery)
//! the stored row is kept as it is, the process batch is still written so an
//! interrupted first delivery completes, and no alerts are raised again.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::alerts::AlertEngine;
use crate::clock::Clock;
use crate::domain::Enrichment;
use crate::query::LogQueryService;
use crate::storage::{LogRepository, ProcessRepository, Repositories, StorageError, StorageResult};

use super::error::PipelineError;
use super::normalizer::{BrokerMessage, Normalizer};

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

/// Bounded retry for repository writes
///
/// Attempt `n` that fails waits `backoff_ms * n` before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff_ms: 0,
        }
    }

    async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = StorageResult<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e @ StorageError::Conflict(_)) => return Err(e),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!(operation, attempt, "write failed, retrying: {}", e);
                    tokio::time::sleep(Duration::from_millis(self.backoff_ms * attempt as u64))
                        .await;
                    attempt += 1;
                }
            }
        }
    }
}

/// What one successfully handled message produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub log_id: Uuid,
    pub organization_id: String,
    pub processes: usize,
    pub alerts: usize,
    /// The record was already stored by an earlier delivery
    pub duplicate: bool,
}

pub struct IngestPipeline {
    normalizer: Normalizer,
    logs: Arc<dyn LogRepository>,
    processes: Arc<dyn ProcessRepository>,
    alerts: Arc<AlertEngine>,
    queries: Option<Arc<LogQueryService>>,
    enrichment: Option<Enrichment>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl IngestPipeline {
    pub fn new(repos: &Repositories, alerts: Arc<AlertEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            normalizer: Normalizer::new(Arc::clone(&clock)),
            logs: Arc::clone(&repos.logs),
            processes: Arc::clone(&repos.processes),
            alerts,
            queries: None,
            enrichment: None,
            retry: RetryPolicy::default(),
            clock,
        }
    }

    /// Invalidate the writer's cached queries after each stored record
    pub fn with_query_service(mut self, queries: Arc<LogQueryService>) -> Self {
        self.queries = Some(queries);
        self
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Handle one broker message end to end
    #[instrument(skip_all, fields(coordinates = ?message.coordinates))]
    pub async fn handle_message(
        &self,
        message: &BrokerMessage,
    ) -> Result<IngestOutcome, PipelineError> {
        let normalized = self.normalizer.normalize(message)?;
        let mut record = normalized.record;

        if let Some(enrichment) = &self.enrichment {
            if let Err(e) = record.enrich(enrichment, self.clock.now()) {
                debug!("{}", e);
            }
        }

        let inserted = self
            .retry
            .run("store_log", || self.logs.store(&record))
            .await?;

        if !normalized.processes.is_empty() {
            self.retry
                .run("store_processes", || {
                    self.processes.store_batch(&normalized.processes)
                })
                .await?;
        }

        if let Some(queries) = &self.queries {
            queries.invalidate(&record.organization_id);
        }

        if !inserted {
            debug!(log_id = %record.id, "record already stored, not raising alerts again");
            return Ok(IngestOutcome {
                log_id: record.id,
                organization_id: record.organization_id,
                processes: normalized.processes.len(),
                alerts: 0,
                duplicate: true,
            });
        }

        let alerts = self.alerts.process_record(&record).await?;

        debug!(
            log_id = %record.id,
            org = %record.organization_id,
            alerts = alerts.len(),
            "message ingested"
        );

        Ok(IngestOutcome {
            log_id: record.id,
            organization_id: record.organization_id,
            processes: normalized.processes.len(),
            alerts: alerts.len(),
            duplicate: false,
        })
    }

    /// Handle `messages` in order; one failure does not stop the rest
    #[instrument(skip_all, fields(count = messages.len()))]
    pub async fn handle_batch(
        &self,
        messages: &[BrokerMessage],
    ) -> Vec<Result<IngestOutcome, PipelineError>> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            let result = self.handle_message(message).await;
            if let Err(e) = &result {
                warn!("batch entry skipped: {}", e);
            }
            results.push(result);
        }
        results
    }
}
