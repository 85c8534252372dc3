//! One refresh cycle: fetch everything once, then compute the snapshot with a
//! pure function over that fetched data.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{FetchSettings, ReconcileParams};
use crate::error::{ReconcileError, ReconcileResult};
use crate::feeds::{guarded, CancelToken, DrawFeed, PriceFeed, PrizeBook, PrizeFetcher};
use crate::metrics::snapshot::{MetricsSnapshot, YieldMetrics};
use crate::models::{LiveDraw, PriceQuote, StaticDrawRow};
use crate::reconcile::{DrawRecordStore, Timeline};

/// Everything one refresh reads. Built once, then only borrowed.
#[derive(Debug, Clone)]
pub struct RefreshInputs {
    pub static_rows: Arc<Vec<StaticDrawRow>>,
    pub live: Vec<LiveDraw>,
    pub book: PrizeBook,
    pub price: PriceQuote,
}

/// Store -> timeline -> metrics. No I/O.
pub fn compute_snapshot(
    request_id: u64,
    inputs: &RefreshInputs,
    params: &ReconcileParams,
) -> ReconcileResult<MetricsSnapshot> {
    let store = DrawRecordStore::merge(&inputs.static_rows, &inputs.live, params);
    if store.is_empty() {
        return Err(ReconcileError::insufficient(0, "no draws with a prize pool"));
    }
    let timeline = Arc::new(Timeline::build(store, &inputs.book, params));
    let metrics = YieldMetrics::from_timeline(&timeline, &inputs.price, params)?;

    Ok(MetricsSnapshot {
        request_id,
        computed_at: Utc::now(),
        source_breakdown: timeline.source_breakdown(),
        timeline,
        metrics,
        price: inputs.price.clone(),
        prize_failures: inputs.book.failures().len(),
    })
}

/// Produces snapshots for the cache.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn produce(&self, request_id: u64, cancel: &CancelToken) -> ReconcileResult<MetricsSnapshot>;
}

pub struct MetricsPipeline {
    draw_feed: Arc<dyn DrawFeed>,
    price_feed: Arc<dyn PriceFeed>,
    prizes: Arc<PrizeFetcher>,
    static_rows: Arc<Vec<StaticDrawRow>>,
    settings: FetchSettings,
    params: ReconcileParams,
}

impl MetricsPipeline {
    pub fn new(
        draw_feed: Arc<dyn DrawFeed>,
        price_feed: Arc<dyn PriceFeed>,
        prizes: Arc<PrizeFetcher>,
        static_rows: Arc<Vec<StaticDrawRow>>,
        settings: FetchSettings,
        params: ReconcileParams,
    ) -> Self {
        Self {
            draw_feed,
            price_feed,
            prizes,
            static_rows,
            settings,
            params,
        }
    }

    pub fn params(&self) -> &ReconcileParams {
        &self.params
    }

    fn static_latest(&self) -> u64 {
        self.static_rows.last().map_or(0, |r| r.draw_number)
    }

    /// Fetch the price, the live draws and all prize data for one cycle.
    pub async fn collect(&self, cancel: &CancelToken) -> ReconcileResult<RefreshInputs> {
        let deadline = self.settings.request_timeout;
        let (price, latest) = tokio::join!(
            guarded("price_feed", deadline, cancel, self.price_feed.get_current_price()),
            guarded("draw_feed", deadline, cancel, self.draw_feed.get_latest_draw_id()),
        );
        let price = price?;

        let latest = match latest {
            Ok(id) => id.max(self.static_latest()),
            Err(e) if cancel.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(error = %e, "latest draw id unavailable, using static dataset only");
                self.static_latest()
            }
        };
        if latest == 0 {
            return Err(ReconcileError::insufficient(0, "no draws known"));
        }

        let results: Vec<(u64, ReconcileResult<LiveDraw>)> = stream::iter(1..=latest)
            .map(|n| {
                let feed = self.draw_feed.clone();
                async move { (n, guarded("draw_feed", deadline, cancel, feed.get_draw(n)).await) }
            })
            .buffer_unordered(self.settings.batch_size.max(1))
            .collect()
            .await;

        let mut live = Vec::with_capacity(results.len());
        let mut live_failures = 0usize;
        for (n, res) in results {
            match res {
                Ok(mut draw) => {
                    if draw.draw_number == 0 {
                        draw.draw_number = n;
                    }
                    live.push(draw);
                }
                Err(e) => {
                    live_failures += 1;
                    debug!(draw = n, error = %e, "live draw fetch failed");
                }
            }
        }
        if live_failures > 0 {
            warn!(failed = live_failures, fetched = live.len(), "some live draw fetches failed");
        }

        // Every known draw and its predecessor, for the delta estimate.
        let mut known: BTreeSet<u64> = self.static_rows.iter().map(|r| r.draw_number).collect();
        known.extend(live.iter().map(|d| d.draw_number));
        let needed: Vec<u64> = known.iter().flat_map(|n| [*n, n.saturating_sub(1)]).collect();
        let book = self.prizes.fetch_many(needed, cancel).await;

        if cancel.is_cancelled() {
            return Err(ReconcileError::upstream("refresh", "cancelled"));
        }

        Ok(RefreshInputs {
            static_rows: self.static_rows.clone(),
            live,
            book,
            price,
        })
    }
}

#[async_trait]
impl SnapshotSource for MetricsPipeline {
    async fn produce(&self, request_id: u64, cancel: &CancelToken) -> ReconcileResult<MetricsSnapshot> {
        let started = Instant::now();
        let inputs = self.collect(cancel).await?;
        let snapshot = compute_snapshot(request_id, &inputs, &self.params)?;

        info!(
            request_id,
            draws = snapshot.timeline.len(),
            current_apy = snapshot.metrics.current_apy,
            prize_failures = snapshot.prize_failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "metrics refresh computed"
        );
        Ok(snapshot)
    }
}
