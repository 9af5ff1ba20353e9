//! Tenant-namespaced TTL cache for the query path
//!
//! A single `RwLock<HashMap>` guards every entry: lookups share the read
//! lock, writes and evictions serialize on the write lock. Expired entries are
//! removed lazily on `get` and actively by [`TtlCache::spawn_sweeper`].
//!
//! ## Keys
//!
//! Keys are built only through [`CacheKeys`]:
//!
//! ```text
//! <namespace>:<org length>:<org id>:<discriminators...>
//! ```
//!
//! The length prefix keeps two organizations apart even when one id is a
//! prefix of the other or contains the `:` separator.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::clock::Clock;

/// Default period of the background sweep
pub const DEFAULT_SWEEP_PERIOD: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` never expires
    expires_at: Option<DateTime<Utc>>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory key/value store with per-entry expiry
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry; an expired entry is a miss and is evicted
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        {
            let entries = self.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock, a concurrent `set` may have refreshed it
        let mut entries = self.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            trace!(key, "evicted expired cache entry");
        }
        None
    }

    /// Insert or overwrite `key`; a `ttl` of zero or less never expires
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = if ttl <= Duration::zero() {
            None
        } else {
            Some(self.clock.now() + ttl)
        };

        self.write()
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    pub fn delete(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    /// Drop every entry of every organization
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Remove every key starting with `prefix`, returning how many were removed
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Remove every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until evicted
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Run [`purge_expired`](Self::purge_expired) every `period` until `cancel` fires
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            debug!(removed, "swept expired cache entries");
                        }
                    }
                }
            }
        })
    }
}

/// Builder for every cache key used by the query path
pub struct CacheKeys;

impl CacheKeys {
    pub const LOG: &'static str = "log";
    pub const LOGS_LIST: &'static str = "logs:list";
    pub const LOGS_RANGE: &'static str = "logs:range";
    pub const PROCESSES: &'static str = "processes";

    const NAMESPACES: [&'static str; 4] =
        [Self::LOG, Self::LOGS_LIST, Self::LOGS_RANGE, Self::PROCESSES];

    /// `<namespace>:<org length>:<org id>:`
    pub fn tenant_prefix(namespace: &str, org_id: &str) -> String {
        format!("{namespace}:{}:{org_id}:", org_id.len())
    }

    /// Prefixes covering every cached query of one organization
    pub fn tenant_prefixes(org_id: &str) -> Vec<String> {
        Self::NAMESPACES
            .iter()
            .map(|namespace| Self::tenant_prefix(namespace, org_id))
            .collect()
    }

    pub fn log(org_id: &str, id: Uuid) -> String {
        format!("{}{id}", Self::tenant_prefix(Self::LOG, org_id))
    }

    pub fn logs_list(org_id: &str, limit: usize, offset: usize) -> String {
        format!(
            "{}{limit}:{offset}",
            Self::tenant_prefix(Self::LOGS_LIST, org_id)
        )
    }

    pub fn logs_range(
        org_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> String {
        format!(
            "{}{}:{}:{limit}:{offset}",
            Self::tenant_prefix(Self::LOGS_RANGE, org_id),
            start.timestamp_millis(),
            end.timestamp_millis(),
        )
    }

    pub fn processes(org_id: &str, log_id: Uuid) -> String {
        format!("{}{log_id}", Self::tenant_prefix(Self::PROCESSES, org_id))
    }
}
