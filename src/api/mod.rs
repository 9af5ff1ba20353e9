//! REST API for the hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Tenant context** resolved from the API key before any handler runs
//! - Handlers are thin: each maps one request onto one subsystem call
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check (no key)
//! - `GET /api/v1/logs`, `/logs/range`, `/logs/:id`, `/logs/:id/processes`
//! - `GET /api/v1/alerts`, `/alerts/:id`, `/alerts/status/:status`,
//!   `/alerts/severity/:severity`, `/alerts/source/:source`, `/alerts/trends`,
//!   `/alerts/counts`
//! - `PUT /api/v1/alerts/:id/status`
//! - `POST|GET /api/v1/keys`, `DELETE /api/v1/keys/:id`
//! - `POST /api/v1/ingest`, `/ingest/batch` - agent keys only
//!
//! Every route except health runs behind, in order: tenant authentication,
//! per-key rate limiting, and the key-type guard for its group.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
        }
    }
}

/// Build the full router
pub fn router(state: ApiState) -> Router {
    let customer_routes = Router::new()
        .route("/api/v1/logs", get(routes::logs::list_logs))
        .route("/api/v1/logs/range", get(routes::logs::list_logs_by_range))
        .route("/api/v1/logs/:id", get(routes::logs::get_log))
        .route(
            "/api/v1/logs/:id/processes",
            get(routes::logs::get_log_processes),
        )
        .route("/api/v1/alerts", get(routes::alerts::list_alerts))
        .route("/api/v1/alerts/trends", get(routes::alerts::get_trends))
        .route("/api/v1/alerts/counts", get(routes::alerts::get_counts))
        .route("/api/v1/alerts/:id", get(routes::alerts::get_alert))
        .route(
            "/api/v1/alerts/:id/status",
            put(routes::alerts::update_status),
        )
        .route(
            "/api/v1/alerts/status/:status",
            get(routes::alerts::list_by_status),
        )
        .route(
            "/api/v1/alerts/severity/:severity",
            get(routes::alerts::list_by_severity),
        )
        .route(
            "/api/v1/alerts/source/:source",
            get(routes::alerts::list_by_source),
        )
        .route(
            "/api/v1/keys",
            post(routes::keys::create_key).get(routes::keys::list_keys),
        )
        .route("/api/v1/keys/:id", delete(routes::keys::revoke_key))
        .route_layer(from_fn(middleware::guards::require_customer_key));

    let agent_routes = Router::new()
        .route("/api/v1/ingest", post(routes::ingest::ingest_message))
        .route("/api/v1/ingest/batch", post(routes::ingest::ingest_batch))
        .route_layer(from_fn(middleware::guards::require_agent_key));

    // route_layer wraps what is already there, so the last one added runs first
    let protected = customer_routes
        .merge(agent_routes)
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::tenant_auth,
        ));

    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::alerts::{AlertEngine, AlertThresholds};
    use crate::clock::{Clock, MockClock};
    use crate::domain::KeyType;
    use crate::ingest::IngestPipeline;
    use crate::query::LogQueryService;
    use crate::rate_limit::SlidingWindowLimiter;
    use crate::storage::{MemoryBackend, Repositories};
    use crate::tenant::TenantAuthority;

    fn test_state(rate_limit: usize) -> ApiState {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::default());
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

        ApiState {
            authority: TenantAuthority::new(repos.api_keys.clone(), clock.clone()),
            queries,
            alerts,
            pipeline,
            limiter: Arc::new(SlidingWindowLimiter::new(
                rate_limit,
                chrono::Duration::seconds(60),
                clock.clone(),
            )),
            storage: backend,
            clock,
        }
    }

    async fn issue(state: &ApiState, org: &str, key_type: KeyType) -> String {
        state
            .authority
            .issue_key(org, "test", key_type, None)
            .await
            .unwrap()
            .secret
    }

    fn get(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(key) = key {
            builder = builder.header(middleware::auth::API_KEY_HEADER, key);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let app = router(test_state(10));

        let response = app.oneshot(get("/api/v1/health", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_and_unknown_keys_are_unauthorized() {
        let app = router(test_state(10));

        let response = app
            .clone()
            .oneshot(get("/api/v1/logs", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(get("/api/v1/logs", Some("not-a-key")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_key_type_guards() {
        let state = test_state(10);
        let agent = issue(&state, "acme", KeyType::Agent).await;
        let customer = issue(&state, "acme", KeyType::Customer).await;
        let app = router(state);

        let response = app
            .clone()
            .oneshot(get("/api/v1/logs", Some(&agent)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(get("/api/v1/logs", Some(&customer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/ingest")
            .header(middleware::auth::API_KEY_HEADER, &customer)
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_key_in_query_parameter() {
        let state = test_state(10);
        let customer = issue(&state, "acme", KeyType::Customer).await;
        let app = router(state);

        let response = app
            .oneshot(get(&format!("/api/v1/alerts?api_key={customer}"), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_is_per_key() {
        let state = test_state(2);
        let first = issue(&state, "acme", KeyType::Customer).await;
        let second = issue(&state, "acme", KeyType::Customer).await;
        let app = router(state);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(get("/api/v1/logs", Some(&first)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(get("/api/v1/logs", Some(&first)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app
            .oneshot(get("/api/v1/logs", Some(&second)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    fn post_json(uri: &str, key: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(middleware::auth::API_KEY_HEADER, key)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_key_lifetime_out_of_range_is_bad_request() {
        let state = test_state(10);
        let customer = issue(&state, "acme", KeyType::Customer).await;
        let app = router(state);

        for secs in [i64::MAX, 400_000_000_000_000] {
            let body = json!({ "name": "ci", "key_type": "agent", "expires_in_secs": secs });
            let response = app
                .clone()
                .oneshot(post_json("/api/v1/keys", &customer, &body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let response = app
            .oneshot(get("/api/v1/keys", Some(&customer)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["count"], 1);
    }

    #[tokio::test]
    async fn test_batch_ingest_reports_each_entry() {
        let state = test_state(10);
        let agent = issue(&state, "acme", KeyType::Agent).await;
        let customer = issue(&state, "acme", KeyType::Customer).await;
        let app = router(state);

        let batch = json!([
            { "host": { "hostname": "h1" }, "metrics": { "cpu_usage": 95.0 } },
            { "metrics": {} },
            { "tenant_id": "globex", "host": { "hostname": "h2" }, "metrics": {} },
        ]);
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/ingest/batch", &agent, &batch))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let outcome = body_json(response).await;
        assert_eq!(outcome["accepted"], 2);
        assert_eq!(outcome["failed"], 1);
        assert_eq!(outcome["results"][0]["alerts"], 1);
        assert!(outcome["results"][1]["error"].is_string());

        let response = app
            .clone()
            .oneshot(get("/api/v1/logs", Some(&customer)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["count"], 2);

        let response = app
            .oneshot(post_json("/api/v1/ingest/batch", &agent, &json!([])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_alert_counts_endpoint() {
        let state = test_state(10);
        let agent = issue(&state, "acme", KeyType::Agent).await;
        let customer = issue(&state, "acme", KeyType::Customer).await;
        let app = router(state);

        let payload = json!({
            "host": { "hostname": "h1" },
            "metrics": { "cpu_usage": 95.0 },
        });
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/ingest", &agent, &payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .oneshot(get("/api/v1/alerts/counts", Some(&customer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let counts = body_json(response).await;
        assert_eq!(counts["by_status"]["OPEN"], 1);
        assert_eq!(counts["by_status"]["RESOLVED"], 0);
        assert_eq!(counts["by_severity"]["HIGH"], 1);
        assert_eq!(counts["window"]["count"], 1);
    }

    #[tokio::test]
    async fn test_ingest_stamps_the_callers_organization() {
        let state = test_state(10);
        let agent = issue(&state, "acme", KeyType::Agent).await;
        let customer = issue(&state, "acme", KeyType::Customer).await;
        let app = router(state);

        let payload = json!({
            "tenant_id": "globex",
            "host": { "hostname": "h1" },
            "metrics": { "cpu_usage": 95.0 },
        });
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/ingest")
            .header(middleware::auth::API_KEY_HEADER, &agent)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let outcome = body_json(response).await;
        assert_eq!(outcome["alerts"], 1);

        let log_id = outcome["log_id"].as_str().unwrap().to_string();
        let response = app
            .oneshot(get(&format!("/api/v1/logs/{log_id}"), Some(&customer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["organization_id"], "acme");
    }
}
