//! Sanity-check reconciler.
//!
//! Read-only audit that recomputes each draw's NGR from prize deltas and
//! compares it with what the static dataset says funded the draw.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ReconcileParams;
use crate::error::{ReconcileError, ReconcileResult};
use crate::feeds::{CancelToken, PrizeBook, PrizeFetcher};
use crate::models::StaticDrawRow;
use crate::reconcile::delta::estimate_from_book;
use crate::reconcile::store::DrawRecordStore;

const MATCH_BELOW_PCT: f64 = 5.0;
const CLOSE_BELOW_PCT: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanityStatus {
    Match,
    Close,
    Mismatch,
    MissingData,
}

/// Which draws to audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanityScope {
    All,
    Draws(Vec<u64>),
}

impl FromStr for SanityScope {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(SanityScope::All);
        }
        let draws = s
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                p.trim()
                    .parse::<u64>()
                    .map_err(|_| ReconcileError::invalid(format!("invalid draw number {p:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SanityScope::Draws(draws))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanityResult {
    pub draw_number: u64,
    pub status: SanityStatus,
    pub stored_ngr: Option<f64>,
    pub stored_singles: Option<f64>,
    pub stored_total: Option<f64>,
    pub calculated_ngr: Option<f64>,
    pub difference_pct: Option<f64>,
    pub current_prizes: Option<f64>,
    pub previous_prizes: Option<f64>,
    pub previous_payouts: Option<f64>,
    pub previous_rollover: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitySummary {
    pub total: usize,
    pub matched: usize,
    pub close: usize,
    pub mismatch: usize,
    pub missing_data: usize,
}

impl SanitySummary {
    fn tally(results: &[SanityResult]) -> Self {
        let mut summary = SanitySummary {
            total: results.len(),
            ..Default::default()
        };
        for r in results {
            match r.status {
                SanityStatus::Match => summary.matched += 1,
                SanityStatus::Close => summary.close += 1,
                SanityStatus::Mismatch => summary.mismatch += 1,
                SanityStatus::MissingData => summary.missing_data += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanityReport {
    pub results: Vec<SanityResult>,
    pub summary: SanitySummary,
    pub checked_at: DateTime<Utc>,
}

/// Classify `|stored - calculated| / stored`, returned as a percentage.
pub fn classify(stored_total: f64, calculated: f64) -> (SanityStatus, Option<f64>) {
    if !(stored_total.is_finite() && stored_total > 0.0) || !calculated.is_finite() {
        return (SanityStatus::MissingData, None);
    }
    let pct = (stored_total - calculated).abs() / stored_total * 100.0;
    let status = if pct < MATCH_BELOW_PCT {
        SanityStatus::Match
    } else if pct < CLOSE_BELOW_PCT {
        SanityStatus::Close
    } else {
        SanityStatus::Mismatch
    };
    (status, Some(pct))
}

/// Audit one draw against an already fetched prize book.
pub fn audit_draw(
    draw_number: u64,
    store: &DrawRecordStore,
    book: &PrizeBook,
    params: &ReconcileParams,
) -> SanityResult {
    let previous = draw_number.checked_sub(1).and_then(|p| store.posted(p));
    let stored_ngr = previous.and_then(|p| p.ngr);
    let stored_singles = previous.and_then(|p| p.singles);
    let stored_total =
        stored_ngr.map(|ngr| ngr + stored_singles.unwrap_or(0.0) * params.singles_conversion_rate);

    let mut result = SanityResult {
        draw_number,
        status: SanityStatus::MissingData,
        stored_ngr,
        stored_singles,
        stored_total,
        calculated_ngr: None,
        difference_pct: None,
        current_prizes: None,
        previous_prizes: None,
        previous_payouts: None,
        previous_rollover: None,
        note: None,
    };

    let Some(delta) = estimate_from_book(book, draw_number) else {
        let missing = [draw_number, draw_number.saturating_sub(1)]
            .into_iter()
            .filter(|n| book.get(*n).is_none())
            .map(|n| match book.failure(n) {
                Some(reason) => format!("draw {n}: {reason}"),
                None => format!("draw {n}: no prize data"),
            })
            .collect::<Vec<_>>();
        result.note = Some(missing.join("; "));
        return result;
    };

    result.calculated_ngr = Some(delta.estimated_ngr);
    result.current_prizes = Some(delta.current_total);
    result.previous_prizes = Some(delta.previous_total);
    result.previous_payouts = Some(delta.previous_payouts);
    result.previous_rollover = Some(delta.previous_rollover);

    match stored_total {
        Some(stored) => {
            let (status, pct) = classify(stored, delta.estimated_ngr);
            result.status = status;
            result.difference_pct = pct;
        }
        None => result.note = Some(format!("no stored NGR posted by draw {}", draw_number - 1)),
    }
    result
}

/// Build the report for `draws` (draw 1 and duplicates removed, ascending).
pub fn build_report(
    draws: &[u64],
    store: &DrawRecordStore,
    book: &PrizeBook,
    params: &ReconcileParams,
) -> SanityReport {
    let ordered: BTreeSet<u64> = draws.iter().copied().filter(|n| *n > 1).collect();
    let results: Vec<SanityResult> = ordered
        .into_iter()
        .map(|n| audit_draw(n, store, book, params))
        .collect();
    SanityReport {
        summary: SanitySummary::tally(&results),
        results,
        checked_at: Utc::now(),
    }
}

/// Runs audits against freshly fetched prize data.
pub struct SanityChecker {
    fetcher: Arc<PrizeFetcher>,
    store: DrawRecordStore,
    params: ReconcileParams,
}

impl SanityChecker {
    pub fn new(fetcher: Arc<PrizeFetcher>, static_rows: &[StaticDrawRow], params: ReconcileParams) -> Self {
        Self {
            fetcher,
            store: DrawRecordStore::from_static(static_rows, &params),
            params,
        }
    }

    /// Draws to audit. "All" covers every static draw plus the first draw after
    /// the table, which the last static row funds, once the live feed has it.
    pub fn resolve_scope(&self, scope: &SanityScope, live_latest: Option<u64>) -> ReconcileResult<Vec<u64>> {
        match scope {
            SanityScope::All => {
                let mut draws: Vec<u64> = self.store.draw_numbers().filter(|n| *n > 1).collect();
                let funded_by_table = self.store.last_posted().map(|n| n + 1);
                if let (Some(next), Some(latest)) = (funded_by_table, live_latest) {
                    if next > 1 && next <= latest && !draws.contains(&next) {
                        draws.push(next);
                    }
                }
                Ok(draws)
            }
            SanityScope::Draws(draws) => {
                if draws.is_empty() {
                    return Err(ReconcileError::invalid("no draw numbers requested"));
                }
                if draws.contains(&0) {
                    return Err(ReconcileError::invalid("draw numbers start at 1"));
                }
                Ok(draws.iter().copied().filter(|n| *n > 1).collect())
            }
        }
    }

    pub async fn run(&self, scope: &SanityScope, cancel: &CancelToken) -> ReconcileResult<SanityReport> {
        let live_latest = match scope {
            SanityScope::All => match self.fetcher.latest_draw_id(cancel).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "latest draw id unavailable, auditing static draws only");
                    None
                }
            },
            SanityScope::Draws(_) => None,
        };
        let draws = self.resolve_scope(scope, live_latest)?;
        let needed = draws.iter().flat_map(|n| [*n, n.saturating_sub(1)]);
        let book = self.fetcher.fetch_many(needed, cancel).await;
        let report = build_report(&draws, &self.store, &book, &self.params);

        info!(
            total = report.summary.total,
            matched = report.summary.matched,
            close = report.summary.close,
            mismatch = report.summary.mismatch,
            missing = report.summary.missing_data,
            "sanity check finished"
        );
        Ok(report)
    }
}
