//! Per-key request throttling

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::api::{error::ApiError, state::ApiState};
use crate::tenant::{AuthError, TenantContext};

/// Admit the request against the calling key's sliding window
///
/// Runs after [`tenant_auth`](super::auth::tenant_auth), so the key id is known.
pub async fn rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request
        .extensions()
        .get::<TenantContext>()
        .map(|ctx| ctx.key_id.to_string())
        .ok_or(AuthError::MissingCredential)?;

    if !state.limiter.allow(&identity) {
        debug!(key_id = %identity, "request rate limited");
        return Err(ApiError::RateLimited);
    }

    Ok(next.run(request).await)
}
