//! Consistency cache around the metrics pipeline.
//!
//! Holds the one snapshot every consumer reads. Each refresh takes a
//! monotonically increasing request id; an explicit or scheduled refresh
//! cancels the previous in-flight one, and a result may only commit while its
//! id is the latest started. Readers that find the cache empty join the
//! refresh already running instead of starting their own. Nothing is
//! published before the first successful refresh.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::feeds::CancelToken;
use crate::metrics::pipeline::SnapshotSource;
use crate::metrics::snapshot::MetricsSnapshot;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshFailure {
    pub request_id: u64,
    pub kind: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub has_snapshot: bool,
    pub committed_request_id: Option<u64>,
    pub latest_request_id: u64,
    pub computed_at: Option<DateTime<Utc>>,
    pub stale: bool,
    pub refreshing: bool,
    pub last_error: Option<RefreshFailure>,
}

/// Outcome of the last refresh that was still the latest when it finished.
type Settled = Option<ReconcileResult<Arc<MetricsSnapshot>>>;

pub struct MetricsCache {
    source: Arc<dyn SnapshotSource>,
    current: ArcSwapOption<MetricsSnapshot>,
    latest_id: AtomicU64,
    in_flight: Mutex<Option<CancelToken>>,
    refreshing: AtomicBool,
    settled: watch::Sender<Settled>,
    last_error: RwLock<Option<RefreshFailure>>,
    ttl: Duration,
}

impl MetricsCache {
    pub fn new(source: Arc<dyn SnapshotSource>, ttl: Duration) -> Self {
        let (settled, _) = watch::channel(None);
        Self {
            source,
            current: ArcSwapOption::empty(),
            latest_id: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            refreshing: AtomicBool::new(false),
            settled,
            last_error: RwLock::new(None),
            ttl,
        }
    }

    /// Last committed snapshot, stale or not.
    pub fn snapshot(&self) -> Option<Arc<MetricsSnapshot>> {
        self.current.load_full()
    }

    pub fn is_stale(&self, snapshot: &MetricsSnapshot) -> bool {
        snapshot.age().to_std().map_or(false, |age| age > self.ttl)
    }

    /// Allocate the next request id and cancel whatever was in flight.
    fn begin(&self) -> (u64, CancelToken) {
        let token = CancelToken::new();
        let mut in_flight = self.in_flight.lock();
        let id = self.latest_id.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = in_flight.replace(token.clone()) {
            previous.cancel();
        }
        self.refreshing.store(true, Ordering::SeqCst);
        (id, token)
    }

    /// Commit `result` for `request_id` unless a newer refresh has started.
    /// The latest refresh also wakes every reader waiting on it.
    fn finish(
        &self,
        request_id: u64,
        result: ReconcileResult<MetricsSnapshot>,
    ) -> ReconcileResult<Arc<MetricsSnapshot>> {
        let mut in_flight = self.in_flight.lock();
        let latest = self.latest_id.load(Ordering::SeqCst);
        if request_id != latest {
            debug!(request_id, latest, "discarding superseded refresh");
            return self
                .snapshot()
                .ok_or_else(|| ReconcileError::upstream("metrics_cache", "refresh superseded"));
        }
        *in_flight = None;
        self.refreshing.store(false, Ordering::SeqCst);

        let out = match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let mut committed = false;
                // A commit never moves the snapshot back to an older id.
                self.current.rcu(|cur| match cur {
                    Some(c) if c.request_id > request_id => {
                        committed = false;
                        Some(c.clone())
                    }
                    _ => {
                        committed = true;
                        Some(snapshot.clone())
                    }
                });
                if committed {
                    *self.last_error.write() = None;
                }
                Ok(self.snapshot().unwrap_or(snapshot))
            }
            Err(e) => {
                warn!(request_id, error = %e, "metrics refresh failed");
                *self.last_error.write() = Some(RefreshFailure {
                    request_id,
                    kind: e.kind(),
                    message: e.to_string(),
                    at: Utc::now(),
                });
                Err(e)
            }
        };
        self.settled.send_replace(Some(out.clone()));
        out
    }

    /// Run one refresh now and wait for it. Supersedes any refresh in flight.
    pub async fn refresh(&self) -> ReconcileResult<Arc<MetricsSnapshot>> {
        let (request_id, token) = self.begin();
        let result = self.source.produce(request_id, &token).await;
        self.finish(request_id, result)
    }

    /// Wait for the refresh in flight, or lead one if none is running.
    /// Never cancels anything.
    async fn join_refresh(&self) -> ReconcileResult<Arc<MetricsSnapshot>> {
        // Subscribe before looking at the flag so a settle in between is seen.
        let mut settled = self.settled.subscribe();
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let (request_id, token) = self.begin();
            // Outcomes settled before our id was allocated are not ours to wait on.
            let _ = settled.borrow_and_update();
            let result = self.source.produce(request_id, &token).await;
            let out = self.finish(request_id, result);
            if out.is_ok() || self.latest_id.load(Ordering::SeqCst) == request_id {
                return out;
            }
            // Superseded before anything committed: wait for the replacement.
            debug!(request_id, "cold refresh superseded, waiting for the newer one");
        } else {
            debug!("joining in-flight metrics refresh");
        }

        loop {
            if settled.changed().await.is_err() {
                return Err(ReconcileError::upstream("metrics_cache", "cache dropped"));
            }
            let latest = settled.borrow_and_update().clone();
            if let Some(outcome) = latest {
                return outcome;
            }
        }
    }

    /// Serve the cached snapshot, refreshing in the background once stale.
    /// Blocks only when nothing has ever been computed.
    pub async fn get_or_refresh(self: &Arc<Self>) -> ReconcileResult<Arc<MetricsSnapshot>> {
        match self.snapshot() {
            Some(snapshot) => {
                if self.is_stale(&snapshot) {
                    self.spawn_refresh();
                }
                Ok(snapshot)
            }
            None => self.join_refresh().await,
        }
    }

    /// Background refresh unless one is already running.
    pub fn spawn_refresh(self: &Arc<Self>) {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let _ = cache.refresh().await;
        });
    }

    /// Refresh on a fixed interval for the life of the process.
    pub fn spawn_refresh_loop(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = every.as_secs(), "metrics refresh loop started");
            let start = tokio::time::Instant::now() + every;
            let mut ticker = tokio::time::interval_at(start, every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Ok(snapshot) = self.refresh().await {
                    debug!(request_id = snapshot.request_id, "scheduled refresh committed");
                }
            }
        })
    }

    pub fn status(&self) -> CacheStatus {
        let snapshot = self.snapshot();
        CacheStatus {
            has_snapshot: snapshot.is_some(),
            committed_request_id: snapshot.as_ref().map(|s| s.request_id),
            latest_request_id: self.latest_id.load(Ordering::SeqCst),
            computed_at: snapshot.as_ref().map(|s| s.computed_at),
            stale: snapshot.as_ref().map_or(true, |s| self.is_stale(s)),
            refreshing: self.refreshing.load(Ordering::SeqCst),
            last_error: self.last_error.read().clone(),
        }
    }
}
