//! Direct ingestion endpoint (agent keys)

use axum::{Extension, Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::ingest::{BrokerMessage, IngestOutcome};
use crate::tenant::TenantContext;

/// POST /api/v1/ingest
///
/// Accepts one agent message in the broker wire format. The tenant is always
/// the calling key's organization, whatever the body claims.
pub async fn ingest_message(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Json(mut body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let message = stamped_message(&state, &tenant, &mut body)?;
    let outcome = state.pipeline.handle_message(&message).await?;

    Ok((StatusCode::ACCEPTED, Json(outcome_json(&outcome))))
}

/// POST /api/v1/ingest/batch
///
/// Accepts an array of agent messages, handled in order. Every entry gets its
/// own result; a bad entry does not stop the others.
pub async fn ingest_batch(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Json(entries): Json<Vec<Value>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if entries.is_empty() {
        return Err(ApiError::InvalidRequest("batch must not be empty".to_string()));
    }
    if entries.len() > MAX_BATCH {
        return Err(ApiError::InvalidRequest(format!(
            "batch holds {} messages, at most {MAX_BATCH} are accepted",
            entries.len()
        )));
    }

    let messages = entries
        .into_iter()
        .map(|mut entry| stamped_message(&state, &tenant, &mut entry))
        .collect::<ApiResult<Vec<_>>>()?;

    let results = state.pipeline.handle_batch(&messages).await;
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let results: Vec<Value> = results
        .iter()
        .map(|result| match result {
            Ok(outcome) => outcome_json(outcome),
            Err(e) => json!({ "error": e.to_string() }),
        })
        .collect();

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "accepted": accepted,
            "failed": results.len() - accepted,
            "results": results,
        })),
    ))
}

/// Largest batch accepted in one request
pub const MAX_BATCH: usize = 1000;

/// Force the caller's organization onto `body` and wrap it as a message
fn stamped_message(
    state: &ApiState,
    tenant: &TenantContext,
    body: &mut Value,
) -> ApiResult<BrokerMessage> {
    let Some(fields) = body.as_object_mut() else {
        return Err(ApiError::InvalidRequest(
            "each message must be a JSON object".to_string(),
        ));
    };
    fields.insert("tenant_id".to_string(), json!(tenant.organization_id));
    fields.remove("api_key");

    let value = serde_json::to_vec(body).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(BrokerMessage::synthetic(value).with_timestamp(state.clock.now()))
}

fn outcome_json(outcome: &IngestOutcome) -> Value {
    json!({
        "log_id": outcome.log_id,
        "processes": outcome.processes,
        "alerts": outcome.alerts,
    })
}
