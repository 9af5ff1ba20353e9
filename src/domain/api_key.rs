//! API key credentials

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Which class of client a key was issued to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Metric-producing agents (ingestion endpoints)
    Agent,
    /// Human or dashboard consumers (query endpoints)
    Customer,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Agent => "agent",
            KeyType::Customer => "customer",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "agent" => Ok(KeyType::Agent),
            "customer" => Ok(KeyType::Customer),
            other => Err(format!("unknown key type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Revoked => "revoked",
        }
    }
}

impl FromStr for KeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(KeyStatus::Active),
            "revoked" => Ok(KeyStatus::Revoked),
            other => Err(format!("unknown key status: {other}")),
        }
    }
}

/// A stored credential
///
/// Only the one-way digest of the secret is kept. Whether a key is usable is
/// recomputed from `status` and `expires_at` on every call to
/// [`ApiKey::is_usable`]; it is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub organization_id: String,
    pub key_type: KeyType,
    #[serde(skip_serializing, default)]
    pub key_hash: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub status: KeyStatus,
    pub permissions: Value,
}

impl ApiKey {
    pub fn new(
        organization_id: impl Into<String>,
        name: impl Into<String>,
        key_type: KeyType,
        key_hash: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id: organization_id.into(),
            key_type,
            key_hash: key_hash.into(),
            name: name.into(),
            created_at,
            expires_at: None,
            last_used_at: None,
            status: KeyStatus::Active,
            permissions: Value::Object(Default::default()),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == KeyStatus::Active && !self.is_expired(now)
    }
}
