//! API key issuance and validation
//!
//! Secrets are random UUIDv4 strings handed out once at issuance. Only their
//! SHA-256 hex digest is stored; lookups go digest → key.
//!
//! ## Validation order
//!
//! ```text
//! unknown digest → KeyNotFound
//! status != Active → KeyRevoked   (checked before expiry)
//! expires_at <= now → KeyExpired
//! otherwise → Ok, last_used_at touched in a detached task
//! ```

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{ApiKey, KeyStatus, KeyType};
use crate::storage::{ApiKeyRepository, Page};

use super::context::TenantContext;
use super::error::AuthError;

/// A freshly issued key together with its plaintext secret
///
/// The plaintext is not recoverable after this value is dropped.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedKey {
    pub key: ApiKey,
    pub secret: String,
}

/// Resolves credentials to organizations and manages key lifecycle
#[derive(Clone)]
pub struct TenantAuthority {
    keys: Arc<dyn ApiKeyRepository>,
    clock: Arc<dyn Clock>,
}

/// Stable one-way digest of a plaintext key
pub fn hash_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

impl TenantAuthority {
    pub fn new(keys: Arc<dyn ApiKeyRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { keys, clock }
    }

    /// Resolve a digest to a usable key
    #[instrument(skip_all)]
    pub async fn validate_key(&self, digest: &str) -> Result<ApiKey, AuthError> {
        let key = self
            .keys
            .get_by_hash(digest)
            .await?
            .ok_or(AuthError::KeyNotFound)?;

        if key.status != KeyStatus::Active {
            debug!(key_id = %key.id, "rejected revoked key");
            return Err(AuthError::KeyRevoked);
        }

        let now = self.clock.now();
        if key.is_expired(now) {
            debug!(key_id = %key.id, "rejected expired key");
            return Err(AuthError::KeyExpired);
        }

        self.touch_last_used(&key);
        Ok(key)
    }

    /// Hash `plaintext`, validate it and derive the request's tenant context
    pub async fn authenticate(&self, plaintext: &str) -> Result<TenantContext, AuthError> {
        if plaintext.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let key = self.validate_key(&hash_key(plaintext)).await?;
        Ok(TenantContext::from(&key))
    }

    /// Record use of a key without holding up the caller
    fn touch_last_used(&self, key: &ApiKey) {
        let keys = Arc::clone(&self.keys);
        let org_id = key.organization_id.clone();
        let key_id = key.id;
        let at = self.clock.now();

        tokio::spawn(async move {
            if let Err(e) = keys.update_last_used(&org_id, key_id, at).await {
                warn!(%key_id, "failed to update key last_used_at: {}", e);
            }
        });
    }

    /// Create a key for `organization_id`; `ttl` of `None` never expires
    #[instrument(skip(self))]
    pub async fn issue_key(
        &self,
        organization_id: &str,
        name: &str,
        key_type: KeyType,
        ttl: Option<Duration>,
    ) -> Result<IssuedKey, AuthError> {
        let secret = Uuid::new_v4().to_string();
        let now = self.clock.now();

        let expires_at = match ttl {
            Some(ttl) => Some(now.checked_add_signed(ttl).ok_or(AuthError::InvalidExpiry)?),
            None => None,
        };

        let mut key = ApiKey::new(organization_id, name, key_type, hash_key(&secret), now);
        key.expires_at = expires_at;

        self.keys.create(&key).await?;
        debug!(key_id = %key.id, "issued API key");

        Ok(IssuedKey { key, secret })
    }

    /// Revoke one of the organization's keys
    pub async fn revoke_key(&self, organization_id: &str, key_id: Uuid) -> Result<(), AuthError> {
        if self.keys.revoke(organization_id, key_id).await? {
            debug!(%key_id, "revoked API key");
            Ok(())
        } else {
            Err(AuthError::KeyNotFound)
        }
    }

    pub async fn list_keys(
        &self,
        organization_id: &str,
        page: Page,
    ) -> Result<Vec<ApiKey>, AuthError> {
        Ok(self.keys.list_by_organization(organization_id, page).await?)
    }
}
