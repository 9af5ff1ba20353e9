//! Alert engine errors

use std::fmt;

use uuid::Uuid;

use crate::storage::StorageError;

#[derive(Debug)]
pub enum AlertError {
    /// No alert with this id in the caller's organization
    NotFound(Uuid),

    /// Alert repository failure
    Storage(StorageError),
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertError::NotFound(id) => write!(f, "alert {} not found", id),
            AlertError::Storage(err) => write!(f, "alert storage failed: {}", err),
        }
    }
}

impl std::error::Error for AlertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AlertError::Storage(err) => Some(err),
            AlertError::NotFound(_) => None,
        }
    }
}

impl From<StorageError> for AlertError {
    fn from(err: StorageError) -> Self {
        AlertError::Storage(err)
    }
}
