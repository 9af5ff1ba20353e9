//! Integration tests for the ingestion path
//!
//! These tests verify that:
//! - One message becomes one stored record plus its processes and alerts
//! - Redelivery of the same broker coordinates does not duplicate data
//! - Invalid payloads are rejected before anything is written
//! - Every write lands in the organization named by the payload

use std::sync::Arc;
use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use fleetlog::{
    domain::{AlertSeverity, AlertStatus},
    ingest::{IngestError, PipelineError},
    query::QueryError,
    storage::{MemoryBackend, Page, Repositories},
};
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn test_high_cpu_message_produces_log_and_alert() {
    let hub = TestHub::new();
    let payload = agent_payload("acme", "h1", 95.0);

    let outcome = hub
        .pipeline
        .handle_message(&message("system-metrics", 0, 0, &payload))
        .await
        .unwrap();

    assert_eq!(outcome.organization_id, "acme");
    assert_eq!(outcome.alerts, 1);
    assert_eq!(hub.backend.log_count().await, 1);

    let log = hub.queries.get_log("acme", outcome.log_id).await.unwrap();
    assert_eq!(log.host, "h1");
    assert_eq!(log.host_metrics.cpu_usage, 95.0);

    let alerts = hub.alerts.list_alerts("acme", Page::default()).await.unwrap();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.severity, AlertSeverity::High);
    assert_eq!(alert.status, AlertStatus::Open);
    assert_eq!(alert.source, "h1");
    assert_eq!(alert.related_logs, vec![outcome.log_id]);
    assert_eq!(alert.title, "High CPU Usage on h1");
}

#[tokio::test]
async fn test_quiet_message_raises_nothing() {
    let hub = TestHub::new();

    let outcome = hub
        .pipeline
        .handle_message(&message("system-metrics", 0, 0, &agent_payload("acme", "h1", 12.0)))
        .await
        .unwrap();

    assert_eq!(outcome.alerts, 0);
    assert_eq!(hub.backend.alert_count().await, 0);
}

#[tokio::test]
async fn test_redelivery_is_idempotent_for_logs_and_processes() {
    let hub = TestHub::new();
    let payload = payload_with_processes(
        "acme",
        "h1",
        json!([
            { "name": "nginx", "pid": 10, "cpu_percent": 1.5, "memory_usage": 1024 },
            { "name": "postgres", "pid": 11, "cpu_percent": 3.0, "memory_usage": 2048 },
        ]),
    );
    let delivery = message("system-metrics", 2, 17, &payload);

    let first = hub.pipeline.handle_message(&delivery).await.unwrap();
    let second = hub.pipeline.handle_message(&delivery).await.unwrap();

    assert_eq!(first.log_id, second.log_id);
    assert!(second.duplicate);
    assert_eq!(hub.backend.log_count().await, 1);

    let processes = hub
        .queries
        .processes_for_log("acme", first.log_id)
        .await
        .unwrap();
    assert_eq!(processes.len(), 2);
}

#[tokio::test]
async fn test_invalid_payloads_write_nothing() {
    let hub = TestHub::new();

    let no_host = json!({ "tenant_id": "acme", "metrics": {} });
    let err = hub
        .pipeline
        .handle_message(&message("system-metrics", 0, 0, &no_host))
        .await
        .unwrap_err();
    assert_matches!(err, PipelineError::Normalize(IngestError::InvalidHostFormat(_)));
    assert!(err.is_rejection());

    let bad_processes = payload_with_processes("acme", "h1", json!("many"));
    let err = hub
        .pipeline
        .handle_message(&message("system-metrics", 0, 1, &bad_processes))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        PipelineError::Normalize(IngestError::InvalidProcessesFormat(_))
    );

    assert_eq!(hub.backend.log_count().await, 0);
    assert_eq!(hub.backend.alert_count().await, 0);
}

#[tokio::test]
async fn test_records_stay_inside_their_organization() {
    let hub = TestHub::new();

    let acme = hub
        .pipeline
        .handle_message(&message("system-metrics", 0, 0, &agent_payload("acme", "h1", 95.0)))
        .await
        .unwrap();
    hub.pipeline
        .handle_message(&message("system-metrics", 0, 1, &agent_payload("globex", "g1", 95.0)))
        .await
        .unwrap();

    let err = hub.queries.get_log("globex", acme.log_id).await.unwrap_err();
    assert_matches!(err, QueryError::NotFound(_));

    let globex_logs = hub.queries.list_logs("globex", Page::default()).await.unwrap();
    assert_eq!(globex_logs.len(), 1);
    assert!(globex_logs.iter().all(|log| log.organization_id == "globex"));

    let globex_alerts = hub.alerts.list_alerts("globex", Page::default()).await.unwrap();
    assert_eq!(globex_alerts.len(), 1);
    assert!(globex_alerts.iter().all(|a| a.organization_id == "globex"));
}

#[tokio::test]
async fn test_new_record_invalidates_cached_pages() {
    let hub = TestHub::new();

    hub.pipeline
        .handle_message(&message("system-metrics", 0, 0, &agent_payload("acme", "h1", 10.0)))
        .await
        .unwrap();
    assert_eq!(
        hub.queries.list_logs("acme", Page::default()).await.unwrap().len(),
        1
    );

    hub.pipeline
        .handle_message(&message("system-metrics", 0, 1, &agent_payload("acme", "h2", 10.0)))
        .await
        .unwrap();
    assert_eq!(
        hub.queries.list_logs("acme", Page::default()).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_alert_store_failure_keeps_the_record() {
    let backend = Arc::new(MemoryBackend::new());
    let flaky = Arc::new(FlakyAlertRepository::new(backend.clone(), 1));
    let mut repos = Repositories::from_backend(backend.clone());
    repos.alerts = flaky.clone();
    let hub = TestHub::with_repos(backend, repos);

    let err = hub
        .pipeline
        .handle_message(&message("system-metrics", 0, 0, &agent_payload("acme", "h1", 95.0)))
        .await
        .unwrap_err();

    assert_matches!(err, PipelineError::Alert(_));
    assert!(!err.is_rejection());
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(hub.backend.log_count().await, 1);
    assert_eq!(hub.backend.alert_count().await, 0);
}
