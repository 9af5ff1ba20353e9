//! Tenant identity: API key authority and request-scoped context

pub mod authority;
pub mod context;
pub mod error;

pub use authority::{IssuedKey, TenantAuthority, hash_key};
pub use context::{TenantContext, require_agent, require_customer, require_key_type};
pub use error::AuthError;
