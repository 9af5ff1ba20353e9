//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - The server answers over a real socket
//! - Agents ingest and customers read back, each with their own key type
//! - Alert status changes and trends work end to end
//! - Key management is confined to the caller's organization

use std::net::SocketAddr;
use std::sync::Arc;

use fleetlog::{
    SystemClock,
    alerts::{AlertEngine, AlertThresholds},
    api::{ApiConfig, ApiState, spawn_api_server},
    clock::Clock,
    domain::KeyType,
    ingest::IngestPipeline,
    query::LogQueryService,
    rate_limit::SlidingWindowLimiter,
    storage::{MemoryBackend, Repositories},
    tenant::TenantAuthority,
};
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::*;

struct TestApi {
    addr: SocketAddr,
    client: reqwest::Client,
    authority: TenantAuthority,
}

impl TestApi {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn key(&self, org: &str, key_type: KeyType) -> String {
        self.authority
            .issue_key(org, "test", key_type, None)
            .await
            .unwrap()
            .secret
    }

    async fn get(&self, path: &str, key: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("X-API-Key", key)
            .send()
            .await
            .unwrap()
    }

    async fn ingest(&self, key: &str, payload: &Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/ingest"))
            .header("X-API-Key", key)
            .json(payload)
            .send()
            .await
            .unwrap()
    }
}

async fn spawn_test_api() -> TestApi {
    let clock: Arc<dyn Clock> = SystemClock::shared();
    let backend = Arc::new(MemoryBackend::new());
    let repos = Repositories::from_backend(backend.clone());

    let queries = Arc::new(LogQueryService::new(
        repos.logs.clone(),
        repos.processes.clone(),
    ));
    let alerts = Arc::new(AlertEngine::new(
        repos.alerts.clone(),
        clock.clone(),
        AlertThresholds::default(),
    ));
    let pipeline = Arc::new(
        IngestPipeline::new(&repos, alerts.clone(), clock.clone())
            .with_query_service(queries.clone()),
    );
    let authority = TenantAuthority::new(repos.api_keys.clone(), clock.clone());

    let state = ApiState {
        authority: authority.clone(),
        queries,
        alerts,
        pipeline,
        limiter: Arc::new(SlidingWindowLimiter::new(
            1000,
            chrono::Duration::seconds(60),
            clock.clone(),
        )),
        storage: backend,
        clock,
    };

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };
    let addr = spawn_api_server(config, state).await.unwrap();

    TestApi {
        addr,
        client: reqwest::Client::new(),
        authority,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let api = spawn_test_api().await;

    let response = api
        .client
        .get(api.url("/api/v1/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_ingest_then_query_and_resolve() {
    let api = spawn_test_api().await;
    let agent = api.key("acme", KeyType::Agent).await;
    let customer = api.key("acme", KeyType::Customer).await;

    let response = api
        .ingest(
            &agent,
            &payload_with_processes(
                "acme",
                "h1",
                json!([{ "name": "burner", "pid": 1, "cpu_percent": 97.5 }]),
            ),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["processes"], 1);
    assert_eq!(outcome["alerts"], 1);
    let log_id = outcome["log_id"].as_str().unwrap().to_string();

    let logs: Value = api.get("/api/v1/logs", &customer).await.json().await.unwrap();
    assert_eq!(logs["count"], 1);

    let processes: Value = api
        .get(&format!("/api/v1/logs/{log_id}/processes"), &customer)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(processes["processes"][0]["name"], "burner");

    let range: Value = api
        .get("/api/v1/logs/range", &customer)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(range["count"], 1);

    let high: Value = api
        .get("/api/v1/alerts/severity/high", &customer)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(high["count"], 1);
    let alert_id = high["alerts"][0]["id"].as_str().unwrap().to_string();

    let response = api
        .client
        .put(api.url(&format!("/api/v1/alerts/{alert_id}/status")))
        .header("X-API-Key", &customer)
        .json(&json!({ "status": "resolved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["status"], "RESOLVED");
    assert!(updated["resolved_at"].is_string());

    let trends: Value = api
        .get("/api/v1/alerts/trends", &customer)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(trends["total"], 1);
    assert_eq!(trends["by_status"]["RESOLVED"], 1);
    assert_eq!(trends["by_source"]["h1"], 1);

    let by_source: Value = api
        .get("/api/v1/alerts/source/h1", &customer)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(by_source["count"], 1);
}

#[tokio::test]
async fn test_other_organizations_see_nothing() {
    let api = spawn_test_api().await;
    let agent = api.key("acme", KeyType::Agent).await;
    let globex = api.key("globex", KeyType::Customer).await;

    let outcome: Value = api
        .ingest(&agent, &agent_payload("acme", "h1", 95.0))
        .await
        .json()
        .await
        .unwrap();
    let log_id = outcome["log_id"].as_str().unwrap();

    let response = api.get(&format!("/api/v1/logs/{log_id}"), &globex).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let alerts: Value = api.get("/api/v1/alerts", &globex).await.json().await.unwrap();
    assert_eq!(alerts["count"], 0);
}

#[tokio::test]
async fn test_invalid_requests() {
    let api = spawn_test_api().await;
    let agent = api.key("acme", KeyType::Agent).await;
    let customer = api.key("acme", KeyType::Customer).await;

    let response = api.ingest(&agent, &json!({ "metrics": {} })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("host"));

    let response = api.get("/api/v1/alerts/status/sleeping", &customer).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = api
        .get(
            "/api/v1/alerts/trends?start=2024-05-02T00:00:00Z&end=2024-05-01T00:00:00Z",
            &customer,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = api
        .get(&format!("/api/v1/alerts/{}", uuid::Uuid::new_v4()), &customer)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_key_management() {
    let api = spawn_test_api().await;
    let customer = api.key("acme", KeyType::Customer).await;
    let globex = api.key("globex", KeyType::Customer).await;

    let response = api
        .client
        .post(api.url("/api/v1/keys"))
        .header("X-API-Key", &customer)
        .json(&json!({ "name": "rack-7", "key_type": "agent", "expires_in_secs": 3600 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let issued: Value = response.json().await.unwrap();
    let new_secret = issued["secret"].as_str().unwrap().to_string();
    let new_id = issued["key"]["id"].as_str().unwrap().to_string();
    assert_eq!(issued["key"]["organization_id"], "acme");
    assert!(issued["key"].get("key_hash").is_none());

    let response = api.ingest(&new_secret, &agent_payload("acme", "h1", 10.0)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let listed: Value = api.get("/api/v1/keys", &customer).await.json().await.unwrap();
    assert_eq!(listed["count"], 2);

    let response = api
        .client
        .delete(api.url(&format!("/api/v1/keys/{new_id}")))
        .header("X-API-Key", &globex)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api
        .client
        .delete(api.url(&format!("/api/v1/keys/{new_id}")))
        .header("X-API-Key", &customer)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = api.ingest(&new_secret, &agent_payload("acme", "h1", 10.0)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
