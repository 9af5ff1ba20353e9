//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fleetlog::{
    alerts::{AlertEngine, AlertThresholds},
    cache::TtlCache,
    clock::{Clock, MockClock},
    domain::Alert,
    ingest::{BrokerMessage, IngestPipeline, RetryPolicy},
    query::{LogQueryService, QueryCacheTtl},
    storage::{
        AlertRepository, MemoryBackend, Page, Repositories, StorageError, StorageResult,
        TimeRange,
    },
};
use serde_json::{Value, json};
use uuid::Uuid;

pub fn fixed_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn mock_clock() -> MockClock {
    MockClock::new(fixed_start())
}

/// Agent payload in the broker wire format
pub fn agent_payload(org: &str, host: &str, cpu_usage: f64) -> Value {
    json!({
        "tenant_id": org,
        "api_key": "agent-secret",
        "host": { "hostname": host, "os": "linux" },
        "metrics": { "cpu_usage": cpu_usage, "memory_usage_percent": 40.0 },
    })
}

pub fn payload_with_processes(org: &str, host: &str, processes: Value) -> Value {
    let mut payload = agent_payload(org, host, 10.0);
    payload["processes"] = processes;
    payload
}

pub fn message(topic: &str, partition: i32, offset: i64, payload: &Value) -> BrokerMessage {
    BrokerMessage::new(
        topic.to_string(),
        partition,
        offset,
        serde_json::to_vec(payload).unwrap(),
    )
    .with_timestamp(fixed_start())
}

/// A fully wired in-memory hub
pub struct TestHub {
    pub backend: Arc<MemoryBackend>,
    pub repos: Repositories,
    pub clock: MockClock,
    pub alerts: Arc<AlertEngine>,
    pub queries: Arc<LogQueryService>,
    pub pipeline: Arc<IngestPipeline>,
}

impl TestHub {
    pub fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let repos = Repositories::from_backend(backend.clone());
        Self::with_repos(backend, repos)
    }

    pub fn with_repos(backend: Arc<MemoryBackend>, repos: Repositories) -> Self {
        let clock = mock_clock();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());

        let queries = Arc::new(
            LogQueryService::new(repos.logs.clone(), repos.processes.clone())
                .with_cache(Arc::new(TtlCache::new(shared.clone())), QueryCacheTtl::default()),
        );
        let alerts = Arc::new(AlertEngine::new(
            repos.alerts.clone(),
            shared.clone(),
            AlertThresholds::default(),
        ));
        let pipeline = Arc::new(
            IngestPipeline::new(&repos, alerts.clone(), shared)
                .with_query_service(queries.clone())
                .with_retry(RetryPolicy {
                    attempts: 3,
                    backoff_ms: 1,
                }),
        );

        Self {
            backend,
            repos,
            clock,
            alerts,
            queries,
            pipeline,
        }
    }
}

/// Alert repository that fails the first `failures` writes, then delegates
#[derive(Debug)]
pub struct FlakyAlertRepository {
    inner: Arc<MemoryBackend>,
    failures: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl FlakyAlertRepository {
    pub fn new(inner: Arc<MemoryBackend>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    fn should_fail(&self) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AlertRepository for FlakyAlertRepository {
    async fn store(&self, alert: &Alert) -> StorageResult<()> {
        if self.should_fail() {
            return Err(StorageError::Unavailable("alert store offline".to_string()));
        }
        AlertRepository::store(self.inner.as_ref(), alert).await
    }

    async fn update(&self, alert: &Alert) -> StorageResult<bool> {
        AlertRepository::update(self.inner.as_ref(), alert).await
    }

    async fn find_by_id(&self, org_id: &str, id: Uuid) -> StorageResult<Option<Alert>> {
        AlertRepository::find_by_id(self.inner.as_ref(), org_id, id).await
    }

    async fn list(&self, org_id: &str, page: Page) -> StorageResult<Vec<Alert>> {
        AlertRepository::list(self.inner.as_ref(), org_id, page).await
    }

    async fn find_by_status(
        &self,
        org_id: &str,
        status: fleetlog::domain::AlertStatus,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        AlertRepository::find_by_status(self.inner.as_ref(), org_id, status, page).await
    }

    async fn find_by_severity(
        &self,
        org_id: &str,
        severity: fleetlog::domain::AlertSeverity,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        AlertRepository::find_by_severity(self.inner.as_ref(), org_id, severity, page).await
    }

    async fn find_by_source(
        &self,
        org_id: &str,
        source: &str,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        AlertRepository::find_by_source(self.inner.as_ref(), org_id, source, page).await
    }

    async fn list_by_time_range(
        &self,
        org_id: &str,
        range: TimeRange,
        page: Page,
    ) -> StorageResult<Vec<Alert>> {
        AlertRepository::list_by_time_range(self.inner.as_ref(), org_id, range, page).await
    }

    async fn count_by_status(
        &self,
        org_id: &str,
        status: fleetlog::domain::AlertStatus,
    ) -> StorageResult<u64> {
        AlertRepository::count_by_status(self.inner.as_ref(), org_id, status).await
    }

    async fn count_by_severity(
        &self,
        org_id: &str,
        severity: fleetlog::domain::AlertSeverity,
    ) -> StorageResult<u64> {
        AlertRepository::count_by_severity(self.inner.as_ref(), org_id, severity).await
    }

    async fn count_by_time_range(&self, org_id: &str, range: TimeRange) -> StorageResult<u64> {
        AlertRepository::count_by_time_range(self.inner.as_ref(), org_id, range).await
    }
}
