//! Tenant authentication middleware
//!
//! Resolves the request's API key (`X-API-Key` header, or the `api_key` query
//! parameter) to a [`TenantContext`] and stores it in the request extensions.

use axum::{
    body::Body,
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

use crate::api::{error::ApiError, state::ApiState};
use crate::tenant::{AuthError, TenantContext};

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Deserialize)]
struct ApiKeyQuery {
    api_key: Option<String>,
}

fn credential(request: &Request<Body>) -> Option<String> {
    let from_header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        Query::<ApiKeyQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.api_key)
            .filter(|v| !v.is_empty())
    })
}

/// Authentication middleware
pub async fn tenant_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let key = credential(&request).ok_or(AuthError::MissingCredential)?;

    let context = state.authority.authenticate(&key).await.inspect_err(|e| {
        debug!("rejected credential: {}", e);
    })?;

    request.extensions_mut().insert::<TenantContext>(context);
    Ok(next.run(request).await)
}
