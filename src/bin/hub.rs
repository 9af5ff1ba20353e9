use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleetlog::{
    SystemClock,
    alerts::AlertEngine,
    cache::TtlCache,
    clock::Clock,
    config::{Config, StorageConfig, read_config_file},
    domain::KeyType,
    ingest::{BrokerMessage, Consumer, DeadLetter, IngestPipeline},
    query::{CachedLogs, LogQueryService},
    storage::{MemoryBackend, Repositories, StorageBackend},
    tenant::TenantAuthority,
};
#[cfg(feature = "api")]
use fleetlog::rate_limit::SlidingWindowLimiter;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON); defaults apply when omitted
    #[arg(short)]
    file: Option<String>,

    /// Replay an NDJSON file of agent messages as partition 0 of the topic
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Append skipped messages to this NDJSON file
    #[arg(long)]
    dead_letter: Option<PathBuf>,

    /// Issue an agent and a customer key for this organization and print them
    #[arg(long)]
    bootstrap_org: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetlog", LevelFilter::TRACE),
        ("fleetlog_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn open_storage(
    config: &StorageConfig,
) -> anyhow::Result<(Repositories, Arc<dyn StorageBackend>)> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, nothing will be persisted");
            let backend = Arc::new(MemoryBackend::new());
            Ok((Repositories::from_backend(backend.clone()), backend))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = Arc::new(
                fleetlog::storage::sqlite::SqliteBackend::new(path)
                    .await
                    .context("opening SQLite storage")?,
            );
            Ok((Repositories::from_backend(backend.clone()), backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("built without the storage-sqlite feature")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    let clock: Arc<dyn Clock> = SystemClock::shared();
    let shutdown = CancellationToken::new();

    let (repos, storage) = open_storage(&config.storage).await?;

    let mut queries = LogQueryService::new(repos.logs.clone(), repos.processes.clone());
    if config.cache.enabled {
        let cache = Arc::new(TtlCache::<CachedLogs>::new(clock.clone()));
        cache.spawn_sweeper(config.cache.sweep_period(), shutdown.clone());
        queries = queries.with_cache(cache, config.cache.ttl());
    }
    let queries = Arc::new(queries);

    let alerts = Arc::new(AlertEngine::new(
        repos.alerts.clone(),
        clock.clone(),
        config.alerts,
    ));

    let mut pipeline = IngestPipeline::new(&repos, alerts.clone(), clock.clone())
        .with_query_service(queries.clone())
        .with_retry(config.ingest.retry);
    if let Some(enrichment) = config.enrichment.clone() {
        pipeline = pipeline.with_enrichment(enrichment);
    }
    let pipeline = Arc::new(pipeline);

    let authority = TenantAuthority::new(repos.api_keys.clone(), clock.clone());

    if let Some(org) = &args.bootstrap_org {
        for key_type in [KeyType::Agent, KeyType::Customer] {
            let issued = authority
                .issue_key(org, &format!("bootstrap-{key_type}"), key_type, None)
                .await
                .context("issuing bootstrap key")?;
            println!("{org} {key_type} key: {}", issued.secret);
        }
    }

    #[cfg(feature = "api")]
    {
        let limiter = Arc::new(SlidingWindowLimiter::new(
            config.rate_limit.limit,
            config.rate_limit.window(),
            clock.clone(),
        ));
        limiter.spawn_sweeper(config.rate_limit.sweep_period(), shutdown.clone());

        let state = fleetlog::api::ApiState {
            authority: authority.clone(),
            queries: queries.clone(),
            alerts: alerts.clone(),
            pipeline: pipeline.clone(),
            limiter,
            storage: storage.clone(),
            clock: clock.clone(),
        };
        let api_config = fleetlog::api::ApiConfig {
            bind_addr: config.api.bind,
            enable_cors: config.api.enable_cors,
        };
        fleetlog::api::spawn_api_server(api_config, state).await?;
    }

    let mut consumer = Consumer::new(pipeline).with_cancellation(shutdown.clone());
    let mut dead_letter_writer = None;
    if let Some(path) = args.dead_letter.clone() {
        let (tx, rx) = mpsc::channel(256);
        dead_letter_writer = Some(tokio::spawn(write_dead_letters(path, rx)));
        consumer = consumer.with_dead_letter(tx);
    }

    let mut partitions = Vec::new();
    if let Some(path) = args.replay.clone() {
        let (tx, rx) = mpsc::channel(1024);
        partitions.push((0, rx));
        tokio::spawn(replay_file(
            path,
            config.ingest.topic.clone(),
            tx,
            clock.clone(),
            shutdown.clone(),
        ));
    }
    let consumer = consumer.spawn(partitions);
    let stats = consumer.stats();

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown requested");

    shutdown.cancel();
    consumer.wait().await;

    // the workers held the last senders, so the writer drains and exits
    if let Some(writer) = dead_letter_writer {
        if let Err(e) = writer.await {
            error!("dead-letter writer failed: {e}");
        }
    }

    let snapshot = stats.snapshot();
    info!(
        processed = snapshot.processed,
        duplicates = snapshot.duplicates,
        rejected = snapshot.rejected,
        failed = snapshot.failed,
        alerts = snapshot.alerts_raised,
        "consumer summary"
    );

    storage.close().await?;
    Ok(())
}

/// Feed every line of `path` into the partition channel, one offset per line
async fn replay_file(
    path: PathBuf,
    topic: String,
    tx: mpsc::Sender<BrokerMessage>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            error!("cannot open replay file {}: {e}", path.display());
            return;
        }
    };

    let mut lines = BufReader::new(file).lines();
    let mut offset: i64 = 0;

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                let message = BrokerMessage::new(topic.clone(), 0, offset, line.into_bytes())
                    .with_timestamp(clock.now());
                if tx.send(message).await.is_err() {
                    break;
                }
                offset += 1;
            }
            Ok(None) => {
                info!("replay finished after {offset} messages");
                break;
            }
            Err(e) => {
                error!("error while reading replay file: {e}");
                break;
            }
        }
    }
}

async fn write_dead_letters(path: PathBuf, mut rx: mpsc::Receiver<DeadLetter>) {
    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            error!("cannot open dead-letter file {}: {e}", path.display());
            return;
        }
    };

    let mut written = 0usize;
    while let Some(letter) = rx.recv().await {
        let entry = serde_json::json!({
            "coordinates": letter.message.coordinates.as_ref().map(ToString::to_string),
            "reason": letter.reason,
            "payload": String::from_utf8_lossy(&letter.message.value),
        });

        let mut line = entry.to_string();
        line.push('\n');
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!("failed to write dead letter: {e}");
        } else {
            written += 1;
            debug!("dead letter written");
        }
    }

    if let Err(e) = file.flush().await {
        warn!("failed to flush dead-letter file: {e}");
    }
    info!("dead-letter writer stopped after {written} letters");
}
