//! Persistence for logs, processes, alerts and API keys
//!
//! Storage is reached only through the repository traits in [`backend`], so
//! the ingest pipeline, the alert engine and the API never know which backend
//! they are wired to.
//!
//! ## Backends
//!
//! - **SQLite** (default): embedded database file, migrations applied on open
//! - **In-Memory**: no persistence, for tests and throwaway runs
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetlog::storage::{Repositories, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = Arc::new(SqliteBackend::new("./fleetlog.db").await?);
//!     let repos = Repositories::from_backend(backend);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{
    AlertRepository, ApiKeyRepository, HealthStatus, LogRepository, Page, ProcessRepository,
    Repositories, StorageBackend, TimeRange,
};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
