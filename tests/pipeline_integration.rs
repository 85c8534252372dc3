//! End-to-end refresh and audit through in-memory feeds.
//!
//! The static dataset is written to a temp file and loaded the same way the
//! server loads it; draw and price feeds are fakes behind the feed traits.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drawyield_backend::config::{FetchSettings, ReconcileParams};
use drawyield_backend::feeds::{
    load_static_dataset, CancelToken, DrawFeed, PriceFeed, PrizeFetcher,
};
use drawyield_backend::metrics::{MetricsCache, MetricsPipeline};
use drawyield_backend::models::{
    DrawStatus, JackpotSignal, LiveDraw, NgrSource, PriceQuote, PrizeTier, StaticDrawRow,
};
use drawyield_backend::reconcile::{SanityChecker, SanityScope, SanityStatus};

const DATASET: &str = r#"[
  {"drawNumber": 59, "date": "2024-12-20", "prizePool": 2900000, "jackpotted": 2500000,
   "ngrAdded": 165000, "singlesAdded": 27000, "prizepoolSplit": "30-14-8-9-7-6-5-10-11",
   "totalStaked": 9000000},
  {"drawNumber": 60, "date": "2024-12-27", "prizePool": "3,000,000", "jackpotted": 2600000,
   "ngrAdded": "170,000", "singlesAdded": 28000, "prizepoolSplit": "30-14-8-9-7-6-5-10-11"},
  {"drawNumber": 61, "date": "2025-01-03", "prizePool": 3103837, "jackpotted": 33626,
   "ngrAdded": 173555, "singlesAdded": 29042},
  {"drawNumber": 62, "date": "2025-01-10", "prizePool": 3300000, "jackpotted": 2800000,
   "ngrAdded": null, "singlesAdded": ""}
]"#;

fn tier(category: &str, amount: f64, win_count: u64, win: f64) -> PrizeTier {
    PrizeTier {
        category: category.to_string(),
        amount,
        win_count,
        win,
    }
}

struct FakeDrawFeed {
    live: HashMap<u64, LiveDraw>,
    prizes: HashMap<u64, Vec<PrizeTier>>,
    latest: u64,
}

impl FakeDrawFeed {
    fn new() -> Self {
        let mut live = HashMap::new();
        for (n, pool) in [(60, 3_000_000.0), (61, 3_103_837.0), (62, 3_300_000.0), (63, 3_350_000.0)] {
            live.insert(
                n,
                LiveDraw {
                    draw_number: n,
                    prize_pool_amount: pool,
                    total_staked: 10_000_000.0,
                    total_tickets: None,
                    status: if n == 63 { "open" } else { "completed" }.to_string(),
                    draw_at: Some(Utc.with_ymd_and_hms(2025, 1, 17, 20, 0, 0).unwrap()),
                },
            );
        }

        let mut prizes = HashMap::new();
        prizes.insert(
            61,
            vec![tier("JACKPOT", 3_000_000.0, 1, 2_966_374.0), tier("TIER_2", 103_837.0, 3, 103_837.0)],
        );
        prizes.insert(
            62,
            vec![tier("JACKPOT", 2_800_000.0, 0, 0.0), tier("TIER_2", 200_000.0, 5, 200_000.0)],
        );
        prizes.insert(
            63,
            vec![tier("JACKPOT", 2_850_000.0, 0, 0.0), tier("TIER_2", 210_000.0, 0, 0.0)],
        );

        Self {
            live,
            prizes,
            latest: 63,
        }
    }
}

#[async_trait]
impl DrawFeed for FakeDrawFeed {
    async fn get_draw(&self, draw_id: u64) -> Result<LiveDraw> {
        match self.live.get(&draw_id) {
            Some(d) => Ok(d.clone()),
            None => bail!("HTTP 404 for draw {draw_id}"),
        }
    }

    async fn get_prizes_and_results(&self, draw_id: u64) -> Result<Vec<PrizeTier>> {
        match self.prizes.get(&draw_id) {
            Some(p) => Ok(p.clone()),
            None => bail!("HTTP 500"),
        }
    }

    async fn get_latest_draw_id(&self) -> Result<u64> {
        Ok(self.latest)
    }
}

struct FakePriceFeed {
    down: AtomicBool,
}

#[async_trait]
impl PriceFeed for FakePriceFeed {
    async fn get_current_price(&self) -> Result<PriceQuote> {
        if self.down.load(Ordering::SeqCst) {
            bail!("HTTP 429 rate limited");
        }
        Ok(PriceQuote {
            usd: 0.5,
            usd_24h_change: Some(2.5),
            as_of: Utc::now(),
        })
    }
}

fn load_rows() -> Arc<Vec<StaticDrawRow>> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(DATASET.as_bytes()).unwrap();
    Arc::new(load_static_dataset(file.path()).unwrap())
}

fn settings() -> FetchSettings {
    FetchSettings {
        request_timeout: Duration::from_secs(2),
        batch_size: 4,
        prize_cache_ttl: Duration::from_secs(60),
    }
}

struct Harness {
    cache: Arc<MetricsCache>,
    sanity: SanityChecker,
    price: Arc<FakePriceFeed>,
}

fn harness() -> Harness {
    let params = ReconcileParams::default();
    let rows = load_rows();
    let draw_feed: Arc<dyn DrawFeed> = Arc::new(FakeDrawFeed::new());
    let price = Arc::new(FakePriceFeed {
        down: AtomicBool::new(false),
    });
    let prizes = Arc::new(PrizeFetcher::new(draw_feed.clone(), settings()));
    let pipeline = Arc::new(MetricsPipeline::new(
        draw_feed,
        price.clone(),
        prizes.clone(),
        rows.clone(),
        settings(),
        params.clone(),
    ));

    Harness {
        cache: Arc::new(MetricsCache::new(pipeline, Duration::from_secs(300))),
        sanity: SanityChecker::new(prizes, &rows, params),
        price,
    }
}

#[tokio::test]
async fn test_refresh_reconciles_timeline() {
    let h = harness();
    let snapshot = h.cache.refresh().await.unwrap();
    let timeline = &snapshot.timeline;

    assert_eq!(
        timeline.records().iter().map(|r| r.draw_number).collect::<Vec<_>>(),
        vec![59, 60, 61, 62, 63]
    );

    let d59 = timeline.get(59).unwrap();
    assert_eq!(d59.ngr_source, NgrSource::Estimated);
    assert_eq!(d59.ngr_added, 0.15 * 2_900_000.0);

    let d61 = timeline.get(61).unwrap();
    assert!(d61.jackpot_won);
    assert_eq!(d61.jackpot_signal, Some(JackpotSignal::PrizeTier));
    assert!((d61.total_ngr_contribution - 193_800.0).abs() < 1e-6);

    let d62 = timeline.get(62).unwrap();
    assert_eq!(d62.ngr_source, NgrSource::Static);
    assert!((d62.total_ngr_contribution - 198_240.70).abs() < 1e-6);
    assert_eq!(d62.jackpot_replenishment, 2_800_000.0 - 33_626.0);
    assert_eq!(d62.adjusted_ngr, 0.0);
    assert_eq!(d62.total_tickets, 100_000.0);

    let d63 = timeline.get(63).unwrap();
    assert_eq!(d63.status, DrawStatus::Open);
    assert_eq!(d63.ngr_source, NgrSource::Calculated);
    assert_eq!(d63.ngr_added, 260_000.0);
    assert!(d63.prizepool_split.is_some());

    assert_eq!(snapshot.source_breakdown["static"], 3);
    assert_eq!(snapshot.source_breakdown["calculated"], 1);
    assert_eq!(snapshot.source_breakdown["estimated"], 1);
    // Draws 58, 59 and 60 have no prize data in the fake feed.
    assert_eq!(snapshot.prize_failures, 3);
}

#[tokio::test]
async fn test_metrics_are_consistent_with_chart() {
    let h = harness();
    let snapshot = h.cache.refresh().await.unwrap();
    let m = &snapshot.metrics;

    // The open draw is provisional and stays out of the chart.
    assert_eq!(
        m.chart_data.iter().map(|p| p.draw_number).collect::<Vec<_>>(),
        vec![59, 60, 61, 62]
    );
    let max = m.chart_data.iter().map(|p| p.apy).fold(f64::MIN, f64::max);
    assert_eq!(m.highest_apy.apy, max);
    assert_eq!(m.current_apy, m.chart_data[3].apy);
    assert_eq!(m.last_week_apy, Some(m.chart_data[2].apy));

    let personal = snapshot.personal_yield(250_000.0, &ReconcileParams::default()).unwrap();
    assert_eq!(personal.draw_number, 62);
    assert_eq!(personal.figures.ticket_count, 2_500);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json["metrics"]["currentAPY"].is_number());
    assert!(json["metrics"]["highestAPY"]["drawNumber"].is_number());
    assert_eq!(json["sourceBreakdown"]["static"], 3);
}

#[tokio::test]
async fn test_price_outage_yields_error_not_placeholder() {
    let h = harness();
    h.price.down.store(true, Ordering::SeqCst);

    let err = h.cache.get_or_refresh().await.unwrap_err();
    assert_eq!(err.kind(), "upstream_unavailable");
    assert!(h.cache.snapshot().is_none());

    h.price.down.store(false, Ordering::SeqCst);
    h.cache.refresh().await.unwrap();

    // Stale-but-valid data survives a later outage.
    h.price.down.store(true, Ordering::SeqCst);
    assert!(h.cache.refresh().await.is_err());
    assert_eq!(h.cache.snapshot().unwrap().request_id, 2);
    assert!(h.cache.status().last_error.is_some());
}

#[tokio::test]
async fn test_sanity_check_over_fake_feed() {
    let h = harness();
    let scope: SanityScope = "61,62,63".parse().unwrap();
    let report = h.sanity.run(&scope, &CancelToken::new()).await.unwrap();

    assert_eq!(report.summary.total, 3);
    let by_draw: HashMap<u64, _> = report.results.iter().map(|r| (r.draw_number, r)).collect();

    // 60 has no prize data.
    assert_eq!(by_draw[&61].status, SanityStatus::MissingData);

    // 62: stored 198,240.70 vs 3,000,000 - (3,103,837 - 3,070,211) = 2,966,374.
    let d62 = by_draw[&62];
    assert_eq!(d62.status, SanityStatus::Mismatch);
    assert!((d62.stored_total.unwrap() - 198_240.70).abs() < 1e-6);
    assert_eq!(d62.previous_payouts, Some(3_070_211.0));

    // 63: 62 posted nothing.
    let d63 = by_draw[&63];
    assert_eq!(d63.status, SanityStatus::MissingData);
    assert_eq!(d63.calculated_ngr, Some(260_000.0));

    assert!(h.sanity.run(&SanityScope::Draws(vec![0]), &CancelToken::new()).await.is_err());
}

#[tokio::test]
async fn test_sanity_check_all_covers_first_live_draw() {
    let h = harness();
    let report = h.sanity.run(&SanityScope::All, &CancelToken::new()).await.unwrap();

    // Static rows 59..=62, plus 63 which row 62 funds and the live feed knows.
    let numbers: Vec<u64> = report.results.iter().map(|r| r.draw_number).collect();
    assert_eq!(numbers, vec![59, 60, 61, 62, 63]);
    assert_eq!(report.summary.total, 5);
}
