//! Yield metrics derived from one reconciled timeline and one price quote.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::ReconcileParams;
use crate::error::{ReconcileError, ReconcileResult};
use crate::metrics::yield_calc::{compute_yield, YieldFigures};
use crate::models::{DrawRecord, DrawStatus, NgrSource, PriceQuote};
use crate::reconcile::Timeline;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub draw_number: u64,
    pub date: NaiveDate,
    pub apy: f64,
    #[serde(rename = "weeklyYieldUSD")]
    pub weekly_yield_usd: f64,
    #[serde(rename = "adjustedNGR")]
    pub adjusted_ngr: f64,
    pub ngr_source: NgrSource,
    pub jackpot_won: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighestApy {
    pub apy: f64,
    pub draw_number: u64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldMetrics {
    #[serde(rename = "currentAPY")]
    pub current_apy: f64,
    #[serde(rename = "lastWeekAPY")]
    pub last_week_apy: Option<f64>,
    #[serde(rename = "prior4WeekAPY")]
    pub prior_4week_apy: Option<f64>,
    #[serde(rename = "apyChange")]
    pub apy_change: Option<f64>,
    #[serde(rename = "highestAPY")]
    pub highest_apy: HighestApy,
    pub chart_data: Vec<ChartPoint>,
}

/// Yield of a caller-supplied stake on the draw behind `currentAPY`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalYield {
    pub draw_number: u64,
    pub staked_amount: f64,
    #[serde(flatten)]
    pub figures: YieldFigures,
}

fn yield_for(
    rec: &DrawRecord,
    price_usd: f64,
    staked: Option<f64>,
    params: &ReconcileParams,
) -> ReconcileResult<YieldFigures> {
    if rec.status == DrawStatus::Open {
        return Err(ReconcileError::insufficient(rec.draw_number, "draw still open"));
    }
    let Some(split) = rec.prizepool_split.as_ref() else {
        return Err(ReconcileError::insufficient(rec.draw_number, "no prize split"));
    };
    compute_yield(rec.adjusted_ngr, rec.total_tickets, price_usd, split, staked, params)
        .map_err(|e| ReconcileError::insufficient(rec.draw_number, e.to_string()))
}

impl YieldMetrics {
    /// Build every headline figure from the same chart series.
    pub fn from_timeline(
        timeline: &Timeline,
        price: &PriceQuote,
        params: &ReconcileParams,
    ) -> ReconcileResult<Self> {
        let mut chart_data = Vec::with_capacity(timeline.len());
        for rec in timeline.records() {
            match yield_for(rec, price.usd, None, params) {
                Ok(figures) => chart_data.push(ChartPoint {
                    draw_number: rec.draw_number,
                    date: rec.date,
                    apy: figures.effective_apy,
                    weekly_yield_usd: figures.weekly_expected_usd,
                    adjusted_ngr: rec.adjusted_ngr,
                    ngr_source: rec.ngr_source,
                    jackpot_won: rec.jackpot_won,
                }),
                Err(e) => debug!(draw = rec.draw_number, error = %e, "draw left out of chart"),
            }
        }

        let Some(current) = chart_data.last() else {
            let latest = timeline.latest().map_or(0, |r| r.draw_number);
            return Err(ReconcileError::insufficient(
                latest,
                "no draw has enough data to compute yield",
            ));
        };
        let current_apy = current.apy;

        let n = chart_data.len();
        let last_week_apy = (n >= 2).then(|| chart_data[n - 2].apy);

        let window_start = (n - 1).saturating_sub(params.prior_window);
        let prior = &chart_data[window_start..n - 1];
        let prior_4week_apy =
            (!prior.is_empty()).then(|| prior.iter().map(|p| p.apy).sum::<f64>() / prior.len() as f64);
        let apy_change = prior_4week_apy.map(|prior| current_apy - prior);

        // First occurrence wins ties so the marker is stable.
        let best = chart_data
            .iter()
            .fold(None::<&ChartPoint>, |best, p| match best {
                Some(b) if b.apy >= p.apy => Some(b),
                _ => Some(p),
            })
            .unwrap_or(current);
        let highest_apy = HighestApy {
            apy: best.apy,
            draw_number: best.draw_number,
            date: best.date,
        };

        Ok(Self {
            current_apy,
            last_week_apy,
            prior_4week_apy,
            apy_change,
            highest_apy,
            chart_data,
        })
    }

    pub fn current_draw(&self) -> Option<u64> {
        self.chart_data.last().map(|p| p.draw_number)
    }
}

/// One committed refresh. Readers only ever see complete snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub request_id: u64,
    pub computed_at: DateTime<Utc>,
    #[serde(skip)]
    pub timeline: Arc<Timeline>,
    pub metrics: YieldMetrics,
    pub price: PriceQuote,
    pub source_breakdown: BTreeMap<&'static str, usize>,
    /// Draws whose prize data could not be fetched this cycle.
    pub prize_failures: usize,
}

impl MetricsSnapshot {
    /// Staker's figures on the draw behind `currentAPY`, through the same
    /// function as the chart.
    pub fn personal_yield(&self, staked: f64, params: &ReconcileParams) -> ReconcileResult<PersonalYield> {
        if !(staked.is_finite() && staked > 0.0) {
            return Err(ReconcileError::invalid(format!("staked amount must be positive, got {staked}")));
        }
        let draw_number = self
            .metrics
            .current_draw()
            .ok_or_else(|| ReconcileError::insufficient(0, "no current draw"))?;
        let rec = self
            .timeline
            .get(draw_number)
            .ok_or_else(|| ReconcileError::insufficient(draw_number, "draw missing from timeline"))?;
        let figures = yield_for(rec, self.price.usd, Some(staked), params)?;
        Ok(PersonalYield {
            draw_number,
            staked_amount: staked,
            figures,
        })
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.computed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::PrizeBook;
    use crate::models::StaticDrawRow;
    use crate::reconcile::DrawRecordStore;

    fn row(n: u64, pool: f64, ngr: f64, tickets: f64) -> StaticDrawRow {
        StaticDrawRow {
            draw_number: n,
            date: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap() + chrono::Duration::weeks(n as i64),
            prize_pool: pool,
            jackpotted: Some(pool * 0.8),
            ngr_added: Some(ngr),
            singles_added: Some(0.0),
            prizepool_split: Some("30-14-8-9-7-6-5-10-11".parse().unwrap()),
            total_staked: None,
            total_tickets: Some(tickets),
        }
    }

    fn price(usd: f64) -> PriceQuote {
        PriceQuote {
            usd,
            usd_24h_change: Some(-1.2),
            as_of: Utc::now(),
        }
    }

    fn timeline(rows: &[StaticDrawRow]) -> Timeline {
        let params = ReconcileParams::default();
        Timeline::build(DrawRecordStore::from_static(rows, &params), &PrizeBook::new(), &params)
    }

    #[test]
    fn test_highest_matches_chart_max() {
        let params = ReconcileParams::default();
        let rows: Vec<_> = [90_000.0, 250_000.0, 120_000.0, 180_000.0, 110_000.0, 160_000.0, 140_000.0]
            .iter()
            .enumerate()
            .map(|(i, ngr)| row(i as u64 + 1, 2_000_000.0, *ngr, 100_000.0))
            .collect();
        let m = YieldMetrics::from_timeline(&timeline(&rows), &price(0.5), &params).unwrap();

        let max = m.chart_data.iter().map(|p| p.apy).fold(f64::MIN, f64::max);
        assert_eq!(m.highest_apy.apy, max);
        // Draw 3 is funded by draw 2's posted 250k.
        assert_eq!(m.highest_apy.draw_number, 3);
        let point = m.chart_data.iter().find(|p| p.draw_number == 3).unwrap();
        assert_eq!(point.apy, m.highest_apy.apy);
    }

    #[test]
    fn test_headline_figures_come_from_chart() {
        let params = ReconcileParams::default();
        let rows: Vec<_> = (1..=7)
            .map(|n| row(n, 2_000_000.0, 100_000.0 + n as f64 * 10_000.0, 100_000.0))
            .collect();
        let m = YieldMetrics::from_timeline(&timeline(&rows), &price(1.0), &params).unwrap();

        // Draw 1 has no source and yields 0 but still charts.
        assert_eq!(m.chart_data.len(), 7);
        let apys: Vec<f64> = m.chart_data.iter().map(|p| p.apy).collect();
        assert_eq!(m.current_apy, apys[6]);
        assert_eq!(m.last_week_apy, Some(apys[5]));
        let prior = (apys[2] + apys[3] + apys[4] + apys[5]) / 4.0;
        assert!((m.prior_4week_apy.unwrap() - prior).abs() < 1e-12);
        assert!((m.apy_change.unwrap() - (apys[6] - prior)).abs() < 1e-12);
    }

    #[test]
    fn test_single_point_has_no_comparisons() {
        let params = ReconcileParams::default();
        let m = YieldMetrics::from_timeline(&timeline(&[row(5, 1_000_000.0, 10.0, 1_000.0)]), &price(1.0), &params)
            .unwrap();
        assert_eq!(m.last_week_apy, None);
        assert_eq!(m.prior_4week_apy, None);
        assert_eq!(m.apy_change, None);
        assert_eq!(m.highest_apy.draw_number, 5);
    }

    #[test]
    fn test_no_computable_draw_is_insufficient_data() {
        let params = ReconcileParams::default();
        let mut r = row(5, 1_000_000.0, 10.0, 1_000.0);
        r.prizepool_split = None;
        let err = YieldMetrics::from_timeline(&timeline(&[r]), &price(1.0), &params).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn test_personal_yield_uses_current_draw() {
        let params = ReconcileParams::default();
        let rows: Vec<_> = (1..=3).map(|n| row(n, 2_000_000.0, 200_000.0, 100_000.0)).collect();
        let timeline = Arc::new(timeline(&rows));
        let quote = price(0.5);
        let metrics = YieldMetrics::from_timeline(&timeline, &quote, &params).unwrap();
        let snapshot = MetricsSnapshot {
            request_id: 1,
            computed_at: Utc::now(),
            source_breakdown: timeline.source_breakdown(),
            timeline,
            metrics,
            price: quote,
            prize_failures: 0,
        };

        let personal = snapshot.personal_yield(params.reference_stake, &params).unwrap();
        assert_eq!(personal.draw_number, 3);
        assert_eq!(personal.figures.effective_apy, snapshot.metrics.current_apy);
        assert!(snapshot.personal_yield(0.0, &params).is_err());
    }
}
