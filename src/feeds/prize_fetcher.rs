//! Batched prize-tier fetching with a per-draw TTL cache.
//!
//! Prize results for a closed draw never change, so entries are reused across
//! refreshes and audits until the TTL expires.

use futures_util::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::FetchSettings;
use crate::error::ReconcileResult;
use crate::feeds::cancel::{guarded, CancelToken};
use crate::feeds::draw_api::DrawFeed;
use crate::models::PrizeTier;

/// Prize data for one refresh cycle. Every component reads from the same book.
#[derive(Debug, Clone, Default)]
pub struct PrizeBook {
    tiers: HashMap<u64, Arc<Vec<PrizeTier>>>,
    failures: BTreeMap<u64, String>,
}

impl PrizeBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty tier lists count as missing data.
    pub fn insert(&mut self, draw_number: u64, tiers: Arc<Vec<PrizeTier>>) {
        if tiers.is_empty() {
            self.record_failure(draw_number, "empty prize list");
            return;
        }
        self.failures.remove(&draw_number);
        self.tiers.insert(draw_number, tiers);
    }

    pub fn record_failure(&mut self, draw_number: u64, reason: impl Into<String>) {
        self.failures.insert(draw_number, reason.into());
    }

    pub fn get(&self, draw_number: u64) -> Option<&[PrizeTier]> {
        self.tiers.get(&draw_number).map(|t| t.as_slice())
    }

    pub fn failure(&self, draw_number: u64) -> Option<&str> {
        self.failures.get(&draw_number).map(|s| s.as_str())
    }

    pub fn failures(&self) -> &BTreeMap<u64, String> {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

struct CachedPrizes {
    tiers: Arc<Vec<PrizeTier>>,
    fetched_at: Instant,
}

pub struct PrizeFetcher {
    feed: Arc<dyn DrawFeed>,
    cache: RwLock<HashMap<u64, CachedPrizes>>,
    settings: FetchSettings,
}

impl PrizeFetcher {
    pub fn new(feed: Arc<dyn DrawFeed>, settings: FetchSettings) -> Self {
        Self {
            feed,
            cache: RwLock::new(HashMap::with_capacity(256)),
            settings,
        }
    }

    fn cached(&self, draw_number: u64) -> Option<Arc<Vec<PrizeTier>>> {
        let cache = self.cache.read();
        let entry = cache.get(&draw_number)?;
        (entry.fetched_at.elapsed() <= self.settings.prize_cache_ttl).then(|| entry.tiers.clone())
    }

    /// Drop entries past their TTL so the map only holds live data.
    fn prune_expired(&self) {
        let ttl = self.settings.prize_cache_ttl;
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|_, entry| entry.fetched_at.elapsed() <= ttl);
        if cache.len() != before {
            debug!(evicted = before - cache.len(), "pruned expired prize entries");
        }
    }

    /// Latest draw id known to the live feed, under the usual deadline.
    pub async fn latest_draw_id(&self, cancel: &CancelToken) -> ReconcileResult<u64> {
        guarded(
            "draw_feed",
            self.settings.request_timeout,
            cancel,
            self.feed.get_latest_draw_id(),
        )
        .await
    }

    /// Fetch prize tiers for every requested draw. A failed item is recorded in
    /// the book and never aborts the rest of the batch.
    pub async fn fetch_many(
        &self,
        draw_numbers: impl IntoIterator<Item = u64>,
        cancel: &CancelToken,
    ) -> PrizeBook {
        let wanted: BTreeSet<u64> = draw_numbers.into_iter().filter(|n| *n > 0).collect();
        self.prune_expired();
        let mut book = PrizeBook::new();
        let mut to_fetch: Vec<u64> = Vec::new();

        for n in wanted {
            match self.cached(n) {
                Some(tiers) => book.insert(n, tiers),
                None => to_fetch.push(n),
            }
        }

        if to_fetch.is_empty() {
            return book;
        }

        debug!(
            cached = book.len(),
            fetching = to_fetch.len(),
            batch_size = self.settings.batch_size,
            "fetching prize tiers"
        );

        let deadline = self.settings.request_timeout;
        let results: Vec<(u64, _)> = stream::iter(to_fetch.into_iter())
            .map(|n| {
                let feed = self.feed.clone();
                async move {
                    let res = guarded("prize_feed", deadline, cancel, feed.get_prizes_and_results(n))
                        .await;
                    (n, res)
                }
            })
            .buffer_unordered(self.settings.batch_size.max(1))
            .collect()
            .await;

        let mut failed = 0usize;
        for (n, res) in results {
            match res {
                Ok(tiers) => {
                    let tiers = Arc::new(tiers);
                    if !tiers.is_empty() {
                        self.cache.write().insert(
                            n,
                            CachedPrizes {
                                tiers: tiers.clone(),
                                fetched_at: Instant::now(),
                            },
                        );
                    }
                    book.insert(n, tiers);
                }
                Err(e) => {
                    failed += 1;
                    debug!(draw = n, error = %e, "prize fetch failed");
                    book.record_failure(n, e.to_string());
                }
            }
        }

        if failed > 0 {
            warn!(failed, fetched = book.len(), "some prize fetches failed");
        }

        book
    }

    pub fn invalidate(&self, draw_number: u64) {
        self.cache.write().remove(&draw_number);
    }
}
