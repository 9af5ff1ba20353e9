//! Sliding-window admission control
//!
//! Each identity (an API key id, a client address) owns a queue of admission
//! timestamps. A call prunes the queue to the trailing window, then admits and
//! records `now` only while fewer than `limit` admissions remain live.
//! Identities left with an empty queue are dropped so memory tracks active
//! clients only.
//!
//! Single-instance: nothing is shared between hub processes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::clock::Clock;

/// Per-identity sliding-window limiter
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    windows: RwLock<HashMap<String, VecDeque<DateTime<Utc>>>>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            windows: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Remove timestamps that fell out of the window ending at `now`
    fn expire_old(queue: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
        while queue.front().is_some_and(|&ts| ts <= cutoff) {
            queue.pop_front();
        }
    }

    /// Admit one request for `identity`, recording it when admitted
    pub fn allow(&self, identity: &str) -> bool {
        let now = self.clock.now();
        let cutoff = now - self.window;

        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);

        let queue = windows.entry(identity.to_string()).or_default();
        Self::expire_old(queue, cutoff);

        let admitted = queue.len() < self.limit;
        if admitted {
            queue.push_back(now);
        } else {
            trace!(identity, live = queue.len(), "rate limit reached");
        }

        if queue.is_empty() {
            windows.remove(identity);
        }

        admitted
    }

    /// Live admissions currently counted against `identity`
    pub fn live_count(&self, identity: &str) -> usize {
        let cutoff = self.clock.now() - self.window;
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);

        windows
            .get(identity)
            .map(|queue| queue.iter().filter(|&&ts| ts > cutoff).count())
            .unwrap_or(0)
    }

    /// Number of identities currently tracked
    pub fn tracked_identities(&self) -> usize {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Prune every identity and drop the idle ones, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let cutoff = self.clock.now() - self.window;
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);

        let before = windows.len();
        windows.retain(|_, queue| {
            Self::expire_old(queue, cutoff);
            !queue.is_empty()
        });
        before - windows.len()
    }

    /// Run [`sweep`](Self::sweep) every `period` until `cancel` fires
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let dropped = limiter.sweep();
                        if dropped > 0 {
                            debug!(dropped, "dropped idle rate limit windows");
                        }
                    }
                }
            }
        })
    }
}
