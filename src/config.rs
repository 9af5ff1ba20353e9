use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::trace;

use crate::alerts::AlertThresholds;
use crate::domain::Enrichment;
use crate::ingest::RetryPolicy;
use crate::query::QueryCacheTtl;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database file
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./fleetlog.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            enable_cors: true,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: i64,
    #[serde(default = "default_time_range_ttl")]
    pub time_range_ttl_secs: i64,
    #[serde(default = "default_sweep")]
    pub sweep_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            time_range_ttl_secs: default_time_range_ttl(),
            sweep_secs: default_sweep(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> QueryCacheTtl {
        QueryCacheTtl {
            default: chrono::Duration::seconds(self.ttl_secs),
            time_range: chrono::Duration::seconds(self.time_range_ttl_secs),
        }
    }

    pub fn sweep_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_secs.max(1))
    }
}

fn default_cache_ttl() -> i64 {
    300
}

fn default_time_range_ttl() -> i64 {
    60
}

fn default_sweep() -> u64 {
    60
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RateLimitConfig {
    /// Admissions per key per window
    #[serde(default = "default_rate_limit")]
    pub limit: usize,
    #[serde(default = "default_rate_window")]
    pub window_secs: i64,
    /// How often idle keys are dropped from the limiter
    #[serde(default = "default_sweep")]
    pub sweep_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_rate_limit(),
            window_secs: default_rate_window(),
            sweep_secs: default_sweep(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs)
    }

    pub fn sweep_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_secs.max(1))
    }
}

fn default_rate_limit() -> usize {
    100
}

fn default_rate_window() -> i64 {
    60
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct IngestConfig {
    /// Topic name stamped on replayed messages
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_topic() -> String {
    "system-metrics".to_string()
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub alerts: AlertThresholds,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Applied to every ingested record when present
    pub enrichment: Option<Enrichment>,

    #[serde(default)]
    pub ingest: IngestConfig,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
