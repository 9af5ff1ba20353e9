//! API key management endpoints (customer keys)
//!
//! A customer key manages keys of its own organization only.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::domain::KeyType;
use crate::tenant::TenantContext;

use super::PageQuery;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    name: String,
    key_type: KeyType,
    /// Lifetime in seconds; omitted means the key never expires
    expires_in_secs: Option<i64>,
}

/// POST /api/v1/keys
///
/// The response is the only place the plaintext key ever appears
pub async fn create_key(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<CreateKeyRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("name must not be empty".to_string()));
    }
    if request.expires_in_secs.is_some_and(|secs| secs <= 0) {
        return Err(ApiError::InvalidRequest(
            "expires_in_secs must be positive".to_string(),
        ));
    }

    let ttl = match request.expires_in_secs {
        Some(secs) => Some(Duration::try_seconds(secs).ok_or_else(|| {
            ApiError::InvalidRequest("expires_in_secs is out of range".to_string())
        })?),
        None => None,
    };

    let issued = state
        .authority
        .issue_key(&tenant.organization_id, &request.name, request.key_type, ttl)
        .await?;

    Ok((StatusCode::CREATED, Json(json!(issued))))
}

/// GET /api/v1/keys
pub async fn list_keys(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let keys = state
        .authority
        .list_keys(&tenant.organization_id, query.page())
        .await?;

    Ok(Json(json!({
        "keys": keys,
        "count": keys.len(),
    })))
}

/// DELETE /api/v1/keys/:id
pub async fn revoke_key(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .authority
        .revoke_key(&tenant.organization_id, id)
        .await
        .map_err(|e| match e {
            crate::tenant::AuthError::KeyNotFound => {
                ApiError::NotFound(format!("API key {id} not found"))
            }
            other => other.into(),
        })?;

    Ok(StatusCode::NO_CONTENT)
}
