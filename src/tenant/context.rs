//! Request-scoped tenant identity and key-type guards

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{ApiKey, KeyType};

use super::error::AuthError;

/// Who a request acts for
///
/// Derived once from a validated key; every downstream access check reads the
/// organization from here and never from the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    pub organization_id: String,
    pub key_type: KeyType,
    pub key_id: Uuid,
}

impl TenantContext {
    pub fn is_agent(&self) -> bool {
        self.key_type == KeyType::Agent
    }

    pub fn is_customer(&self) -> bool {
        self.key_type == KeyType::Customer
    }
}

impl From<&ApiKey> for TenantContext {
    fn from(key: &ApiKey) -> Self {
        Self {
            organization_id: key.organization_id.clone(),
            key_type: key.key_type,
            key_id: key.id,
        }
    }
}

/// Allow the request only when it carries a context of the `required` type
pub fn require_key_type(
    context: Option<&TenantContext>,
    required: KeyType,
) -> Result<&TenantContext, AuthError> {
    match context {
        Some(ctx) if ctx.key_type == required => Ok(ctx),
        _ => Err(AuthError::Forbidden(required)),
    }
}

pub fn require_agent(context: Option<&TenantContext>) -> Result<&TenantContext, AuthError> {
    require_key_type(context, KeyType::Agent)
}

pub fn require_customer(context: Option<&TenantContext>) -> Result<&TenantContext, AuthError> {
    require_key_type(context, KeyType::Customer)
}
