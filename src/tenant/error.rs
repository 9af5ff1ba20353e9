//! Authentication and authorization failures

use std::fmt;

use crate::domain::KeyType;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum AuthError {
    /// No credential on the request
    MissingCredential,

    /// No key with this digest exists
    KeyNotFound,

    /// The key exists but was revoked
    KeyRevoked,

    /// The key exists but its expiry has passed
    KeyExpired,

    /// Requested key lifetime does not fit the calendar
    InvalidExpiry,

    /// Authenticated, but the endpoint requires the given key type
    Forbidden(KeyType),

    /// Key repository failure
    Storage(StorageError),
}

impl AuthError {
    /// Missing or unusable credential
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::MissingCredential
                | AuthError::KeyNotFound
                | AuthError::KeyRevoked
                | AuthError::KeyExpired
        )
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, AuthError::Forbidden(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredential => write!(f, "API key required"),
            AuthError::KeyNotFound => write!(f, "invalid API key"),
            AuthError::KeyRevoked => write!(f, "API key has been revoked"),
            AuthError::KeyExpired => write!(f, "API key has expired"),
            AuthError::InvalidExpiry => write!(f, "key lifetime is out of range"),
            AuthError::Forbidden(KeyType::Agent) => write!(f, "Agent API key required"),
            AuthError::Forbidden(KeyType::Customer) => write!(f, "Customer API key required"),
            AuthError::Storage(err) => write!(f, "key lookup failed: {}", err),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err)
    }
}
