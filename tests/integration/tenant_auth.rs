//! Integration tests for tenant authentication
//!
//! These tests verify that:
//! - A key resolves to exactly the organization it was issued for
//! - Revocation and expiry take effect on the next request
//! - One organization cannot manage another organization's keys

use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use chrono::Duration;
use fleetlog::{
    domain::KeyType,
    storage::{ApiKeyRepository, MemoryBackend, Page},
    tenant::{AuthError, TenantAuthority, require_agent, require_customer},
};

use crate::helpers::*;

fn authority() -> (fleetlog::MockClock, Arc<MemoryBackend>, TenantAuthority) {
    let clock = mock_clock();
    let backend = Arc::new(MemoryBackend::new());
    let authority = TenantAuthority::new(backend.clone(), Arc::new(clock.clone()));
    (clock, backend, authority)
}

#[tokio::test]
async fn test_key_lifecycle() {
    let (clock, backend, authority) = authority();

    let issued = authority
        .issue_key("acme", "collector", KeyType::Agent, Some(Duration::hours(1)))
        .await
        .unwrap();

    let context = authority.authenticate(&issued.secret).await.unwrap();
    assert_eq!(context.organization_id, "acme");
    assert_eq!(context.key_id, issued.key.id);
    assert!(require_agent(Some(&context)).is_ok());
    assert_matches!(
        require_customer(Some(&context)),
        Err(AuthError::Forbidden(KeyType::Customer))
    );

    // last_used_at is written in the background
    let mut touched = false;
    for _ in 0..50 {
        let stored = backend
            .get_by_id("acme", issued.key.id)
            .await
            .unwrap()
            .unwrap();
        if stored.last_used_at.is_some() {
            touched = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert!(touched);

    clock.advance(Duration::hours(2));
    assert_matches!(
        authority.authenticate(&issued.secret).await,
        Err(AuthError::KeyExpired)
    );
}

#[tokio::test]
async fn test_revocation_is_scoped_to_the_owner() {
    let (_clock, _backend, authority) = authority();

    let acme = authority
        .issue_key("acme", "dashboard", KeyType::Customer, None)
        .await
        .unwrap();

    assert_matches!(
        authority.revoke_key("globex", acme.key.id).await,
        Err(AuthError::KeyNotFound)
    );
    assert!(authority.authenticate(&acme.secret).await.is_ok());

    authority.revoke_key("acme", acme.key.id).await.unwrap();
    assert_matches!(
        authority.authenticate(&acme.secret).await,
        Err(AuthError::KeyRevoked)
    );
}

#[tokio::test]
async fn test_key_listing_is_per_organization() {
    let (_clock, _backend, authority) = authority();

    for name in ["a", "b"] {
        authority
            .issue_key("acme", name, KeyType::Agent, None)
            .await
            .unwrap();
    }
    authority
        .issue_key("globex", "c", KeyType::Customer, None)
        .await
        .unwrap();

    let acme = authority.list_keys("acme", Page::default()).await.unwrap();
    assert_eq!(acme.len(), 2);
    assert!(acme.iter().all(|k| k.organization_id == "acme"));

    let listed = serde_json::to_value(&acme[0]).unwrap();
    assert!(listed.get("key_hash").is_none());
}

#[tokio::test]
async fn test_unknown_and_empty_credentials() {
    let (_clock, _backend, authority) = authority();

    assert_matches!(
        authority.authenticate("").await,
        Err(AuthError::MissingCredential)
    );
    assert_matches!(
        authority.authenticate("never-issued").await,
        Err(AuthError::KeyNotFound)
    );
}
