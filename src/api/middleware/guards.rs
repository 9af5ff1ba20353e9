//! Key-type guards for agent-only and customer-only routes

use axum::{body::Body, extract::Request, middleware::Next, response::Response};

use crate::api::error::ApiError;
use crate::tenant::{TenantContext, require_agent, require_customer};

pub async fn require_agent_key(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    require_agent(request.extensions().get::<TenantContext>())?;
    Ok(next.run(request).await)
}

pub async fn require_customer_key(
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    require_customer(request.extensions().get::<TenantContext>())?;
    Ok(next.run(request).await)
}
