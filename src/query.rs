//! Read-through cached log queries
//!
//! Every lookup goes cache → repository → cache. Keys come from
//! [`CacheKeys`], so two organizations asking the same question never share
//! an entry, and a write by one organization only drops that organization's
//! entries.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::cache::{CacheKeys, TtlCache};
use crate::domain::{LogRecord, ProcessRecord};
use crate::storage::{LogRepository, Page, ProcessRepository, StorageError, TimeRange};

#[derive(Debug)]
pub enum QueryError {
    /// No log with this id in the caller's organization
    NotFound(Uuid),

    /// `start` is after `end`
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    Storage(StorageError),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::NotFound(id) => write!(f, "log {} not found", id),
            QueryError::InvalidRange { start, end } => {
                write!(f, "invalid time range: {} is after {}", start, end)
            }
            QueryError::Storage(err) => write!(f, "log query failed: {}", err),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        QueryError::Storage(err)
    }
}

/// Values held by the query cache
#[derive(Debug, Clone)]
pub enum CachedLogs {
    Log(Box<LogRecord>),
    Logs(Vec<LogRecord>),
    Processes(Vec<ProcessRecord>),
}

/// Cache lifetimes for the two kinds of query
#[derive(Debug, Clone, Copy)]
pub struct QueryCacheTtl {
    /// Single logs, pages and process lists
    pub default: Duration,
    /// Time-range queries
    pub time_range: Duration,
}

impl Default for QueryCacheTtl {
    fn default() -> Self {
        Self {
            default: Duration::minutes(5),
            time_range: Duration::minutes(1),
        }
    }
}

pub struct LogQueryService {
    logs: Arc<dyn LogRepository>,
    processes: Arc<dyn ProcessRepository>,
    cache: Option<Arc<TtlCache<CachedLogs>>>,
    ttl: QueryCacheTtl,
}

impl LogQueryService {
    pub fn new(logs: Arc<dyn LogRepository>, processes: Arc<dyn ProcessRepository>) -> Self {
        Self {
            logs,
            processes,
            cache: None,
            ttl: QueryCacheTtl::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<TtlCache<CachedLogs>>, ttl: QueryCacheTtl) -> Self {
        self.cache = Some(cache);
        self.ttl = ttl;
        self
    }

    fn cached(&self, key: &str) -> Option<CachedLogs> {
        let hit = self.cache.as_ref()?.get(key);
        trace!(key, hit = hit.is_some(), "query cache lookup");
        hit
    }

    fn remember(&self, key: String, value: CachedLogs, ttl: Duration) {
        if let Some(cache) = &self.cache {
            cache.set(key, value, ttl);
        }
    }

    #[instrument(skip(self))]
    pub async fn get_log(&self, org_id: &str, id: Uuid) -> Result<LogRecord, QueryError> {
        let key = CacheKeys::log(org_id, id);
        if let Some(CachedLogs::Log(log)) = self.cached(&key) {
            return Ok(*log);
        }

        let log = self
            .logs
            .find_by_id(org_id, id)
            .await?
            .ok_or(QueryError::NotFound(id))?;

        self.remember(key, CachedLogs::Log(Box::new(log.clone())), self.ttl.default);
        Ok(log)
    }

    #[instrument(skip(self))]
    pub async fn list_logs(&self, org_id: &str, page: Page) -> Result<Vec<LogRecord>, QueryError> {
        let key = CacheKeys::logs_list(org_id, page.limit, page.offset);
        if let Some(CachedLogs::Logs(logs)) = self.cached(&key) {
            return Ok(logs);
        }

        let logs = self.logs.list(org_id, page).await?;
        self.remember(key, CachedLogs::Logs(logs.clone()), self.ttl.default);
        Ok(logs)
    }

    #[instrument(skip(self))]
    pub async fn list_by_time_range(
        &self,
        org_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: Page,
    ) -> Result<Vec<LogRecord>, QueryError> {
        if start > end {
            return Err(QueryError::InvalidRange { start, end });
        }

        let key = CacheKeys::logs_range(org_id, start, end, page.limit, page.offset);
        if let Some(CachedLogs::Logs(logs)) = self.cached(&key) {
            return Ok(logs);
        }

        let logs = self
            .logs
            .list_by_time_range(org_id, TimeRange { start, end }, page)
            .await?;
        self.remember(key, CachedLogs::Logs(logs.clone()), self.ttl.time_range);
        Ok(logs)
    }

    /// Process rows recorded with a log; the log itself must be visible to `org_id`
    #[instrument(skip(self))]
    pub async fn processes_for_log(
        &self,
        org_id: &str,
        log_id: Uuid,
    ) -> Result<Vec<ProcessRecord>, QueryError> {
        let key = CacheKeys::processes(org_id, log_id);
        if let Some(CachedLogs::Processes(rows)) = self.cached(&key) {
            return Ok(rows);
        }

        // 404 for a foreign or unknown log rather than an empty list
        self.get_log(org_id, log_id).await?;

        let rows = self.processes.find_by_log_id(org_id, log_id).await?;
        self.remember(key, CachedLogs::Processes(rows.clone()), self.ttl.default);
        Ok(rows)
    }

    /// Drop every cached query of `org_id`
    pub fn invalidate(&self, org_id: &str) {
        let Some(cache) = &self.cache else {
            return;
        };

        let removed: usize = CacheKeys::tenant_prefixes(org_id)
            .iter()
            .map(|prefix| cache.delete_prefix(prefix))
            .sum();

        if removed > 0 {
            debug!(org = org_id, removed, "invalidated cached queries");
        }
    }
}
