//! Partitioned consumption loop
//!
//! One tokio task per claimed partition. Inside a partition messages are
//! handled strictly in order; partitions run independently of each other.
//!
//! ## Skip and advance
//!
//! A message that fails (rejected by the normalizer, or a write that still
//! fails after retries) is logged with its coordinates, counted, optionally
//! forwarded to the dead-letter channel, and its offset is committed anyway.
//! Nothing is redelivered.
//!
//! ## Cancellation
//!
//! The shared [`CancellationToken`] is checked between messages only; a
//! message already being handled runs to completion. A worker waiting on a
//! full dead-letter channel also gives up when cancelled, logging the letter
//! it could not forward.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::normalizer::BrokerMessage;
use super::pipeline::IngestPipeline;

/// A message that was skipped, with the reason
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message: BrokerMessage,
    pub reason: String,
}

/// Counters shared by every partition worker
#[derive(Debug, Default)]
pub struct ConsumerStats {
    processed: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    alerts_raised: AtomicU64,
    committed: Mutex<HashMap<i32, i64>>,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub processed: u64,
    /// Processed messages whose record an earlier delivery already stored
    pub duplicates: u64,
    pub rejected: u64,
    pub failed: u64,
    pub alerts_raised: u64,
    /// Last committed offset per partition
    pub committed: HashMap<i32, i64>,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            committed: self
                .committed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    pub fn committed_offset(&self, partition: i32) -> Option<i64> {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&partition)
            .copied()
    }

    fn commit(&self, message: &BrokerMessage) {
        if let Some(c) = &message.coordinates {
            self.committed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(c.partition, c.offset);
        }
    }
}

/// Builder for a running set of partition workers
pub struct Consumer {
    pipeline: Arc<IngestPipeline>,
    cancel: CancellationToken,
    stats: Arc<ConsumerStats>,
    dead_letter: Option<mpsc::Sender<DeadLetter>>,
}

impl Consumer {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self {
            pipeline,
            cancel: CancellationToken::new(),
            stats: Arc::new(ConsumerStats::default()),
            dead_letter: None,
        }
    }

    /// Use an externally owned cancellation signal
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Forward every skipped message to `sender`
    pub fn with_dead_letter(mut self, sender: mpsc::Sender<DeadLetter>) -> Self {
        self.dead_letter = Some(sender);
        self
    }

    /// Start one worker per `(partition, receiver)` pair
    pub fn spawn(self, partitions: Vec<(i32, mpsc::Receiver<BrokerMessage>)>) -> ConsumerHandle {
        info!(partitions = partitions.len(), "starting consumer");

        let workers: Vec<JoinHandle<()>> = partitions
            .into_iter()
            .map(|(partition, receiver)| {
                let worker = PartitionWorker {
                    partition,
                    receiver,
                    pipeline: Arc::clone(&self.pipeline),
                    cancel: self.cancel.clone(),
                    stats: Arc::clone(&self.stats),
                    dead_letter: self.dead_letter.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let join = tokio::spawn(async move {
            for result in join_all(workers).await {
                if let Err(e) = result {
                    error!("partition worker panicked: {}", e);
                }
            }
            info!("consumer stopped");
        });

        ConsumerHandle {
            cancel: self.cancel,
            stats: self.stats,
            join,
        }
    }
}

struct PartitionWorker {
    partition: i32,
    receiver: mpsc::Receiver<BrokerMessage>,
    pipeline: Arc<IngestPipeline>,
    cancel: CancellationToken,
    stats: Arc<ConsumerStats>,
    dead_letter: Option<mpsc::Sender<DeadLetter>>,
}

impl PartitionWorker {
    #[instrument(skip(self), fields(partition = self.partition))]
    async fn run(mut self) {
        debug!("partition worker started");

        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("cancellation requested");
                    break;
                }
                next = self.receiver.recv() => match next {
                    Some(message) => message,
                    None => {
                        debug!("partition channel closed");
                        break;
                    }
                },
            };

            self.handle(message).await;
        }

        debug!("partition worker stopped");
    }

    async fn handle(&self, message: BrokerMessage) {
        match self.pipeline.handle_message(&message).await {
            Ok(outcome) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                if outcome.duplicate {
                    self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                }
                self.stats
                    .alerts_raised
                    .fetch_add(outcome.alerts as u64, Ordering::Relaxed);
            }
            Err(e) => {
                let coordinates = message
                    .coordinates
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "synthetic".to_string());

                if e.is_rejection() {
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(%coordinates, "skipping invalid message: {}", e);
                } else {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!(%coordinates, "skipping message after failed handling: {}", e);
                }

                if let Some(sender) = &self.dead_letter {
                    let letter = DeadLetter {
                        message: message.clone(),
                        reason: e.to_string(),
                    };
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            error!(
                                %coordinates,
                                "dead letter dropped, cancelled while the channel was full"
                            );
                        }
                        sent = sender.send(letter) => {
                            if sent.is_err() {
                                warn!(%coordinates, "dead-letter channel closed");
                            }
                        }
                    }
                }
            }
        }

        self.stats.commit(&message);
    }
}

/// Control handle for a running consumer
pub struct ConsumerHandle {
    cancel: CancellationToken,
    stats: Arc<ConsumerStats>,
    join: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every worker and wait for them to stop
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.wait().await;
    }

    /// Wait for every worker to stop on its own (channels closed or cancelled)
    pub async fn wait(self) {
        if let Err(e) = self.join.await {
            error!("consumer task failed: {}", e);
        }
    }
}
