//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - Records, processes, alerts and keys written through the hub survive a reopen
//! - Time-range queries read back what the pipeline stored

use std::sync::Arc;

use chrono::Duration;
use fleetlog::{
    alerts::{AlertEngine, AlertThresholds},
    clock::Clock,
    domain::{AlertStatus, KeyType},
    ingest::IngestPipeline,
    query::LogQueryService,
    storage::{Repositories, StorageBackend, sqlite::SqliteBackend},
    tenant::TenantAuthority,
};
use serde_json::json;
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_full_persistence_pipeline() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("fleetlog.db");
    let clock: Arc<dyn Clock> = Arc::new(mock_clock());

    let (log_id, secret) = {
        let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let repos = Repositories::from_backend(backend.clone());
        let alerts = Arc::new(AlertEngine::new(
            repos.alerts.clone(),
            clock.clone(),
            AlertThresholds::default(),
        ));
        let pipeline = IngestPipeline::new(&repos, alerts, clock.clone());

        let payload = payload_with_processes(
            "acme",
            "h1",
            json!({
                "total_count": 1500,
                "list": [{ "name": "worker", "pid": 7, "cpu_percent": 99.0 }],
            }),
        );
        let outcome = pipeline
            .handle_message(&message("system-metrics", 0, 0, &payload))
            .await
            .unwrap();
        // CPU from the process aggregate, plus the process count
        assert_eq!(outcome.alerts, 2);

        let issued = TenantAuthority::new(repos.api_keys.clone(), clock.clone())
            .issue_key("acme", "collector", KeyType::Agent, None)
            .await
            .unwrap();

        backend.close().await.unwrap();
        (outcome.log_id, issued.secret)
    };

    let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let repos = Repositories::from_backend(backend.clone());
    let queries = LogQueryService::new(repos.logs.clone(), repos.processes.clone());

    let log = queries.get_log("acme", log_id).await.unwrap();
    assert_eq!(log.host, "h1");
    assert_eq!(log.process_count, 1500);

    let processes = queries.processes_for_log("acme", log_id).await.unwrap();
    assert_eq!(processes.len(), 1);
    assert_eq!(processes[0].name, "worker");

    let range = queries
        .list_by_time_range(
            "acme",
            fixed_start() - Duration::minutes(1),
            fixed_start() + Duration::minutes(1),
            Default::default(),
        )
        .await
        .unwrap();
    assert_eq!(range.len(), 1);

    let engine = AlertEngine::new(repos.alerts.clone(), clock.clone(), AlertThresholds::default());
    let open = engine
        .list_by_status("acme", AlertStatus::Open, Default::default())
        .await
        .unwrap();
    assert_eq!(open.len(), 2);
    assert!(open.iter().all(|a| a.related_logs == vec![log_id]));

    let context = TenantAuthority::new(repos.api_keys.clone(), clock.clone())
        .authenticate(&secret)
        .await
        .unwrap();
    assert_eq!(context.organization_id, "acme");

    let health = backend.health_check().await.unwrap();
    assert!(health.healthy);
}

#[tokio::test]
async fn test_status_change_survives_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("fleetlog.db");
    let clock = mock_clock();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());

    let alert_id = {
        let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let repos = Repositories::from_backend(backend.clone());
        let engine = Arc::new(AlertEngine::new(
            repos.alerts.clone(),
            shared.clone(),
            AlertThresholds::default(),
        ));
        let pipeline = IngestPipeline::new(&repos, engine.clone(), shared.clone());

        pipeline
            .handle_message(&message("system-metrics", 0, 0, &agent_payload("acme", "h1", 95.0)))
            .await
            .unwrap();
        let alert = engine
            .list_alerts("acme", Default::default())
            .await
            .unwrap()
            .remove(0);

        clock.advance(Duration::minutes(5));
        engine
            .update_status("acme", alert.id, AlertStatus::Resolved)
            .await
            .unwrap();

        backend.close().await.unwrap();
        alert.id
    };

    let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let engine = AlertEngine::new(
        Repositories::from_backend(backend).alerts,
        shared,
        AlertThresholds::default(),
    );

    let alert = engine.get_alert("acme", alert_id).await.unwrap();
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert_eq!(alert.resolved_at, Some(fixed_start() + Duration::minutes(5)));
    assert!(engine.get_alert("globex", alert_id).await.is_err());
}
