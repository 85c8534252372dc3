//! Draw Record Store: static history merged with live per-draw figures.

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ReconcileParams;
use crate::models::{DrawRange, DrawRecord, DrawStatus, LiveDraw, StaticDrawRow};
use crate::reconcile::attribution::PostedFigures;

/// Draws keyed (and therefore ordered) by draw number.
#[derive(Debug, Clone, Default)]
pub struct DrawRecordStore {
    draws: BTreeMap<u64, DrawRecord>,
    /// Posted figures of every static row, kept even when the row itself is
    /// dropped for an empty pool.
    posted: BTreeMap<u64, PostedFigures>,
}

impl DrawRecordStore {
    /// Merge the authoritative-but-lagging static table with live data.
    ///
    /// Live prize-pool and staking figures win when present; static values
    /// fill the gaps. Draws whose pool is still zero afterwards are dropped.
    pub fn merge(static_rows: &[StaticDrawRow], live: &[LiveDraw], params: &ReconcileParams) -> Self {
        let mut draws: BTreeMap<u64, DrawRecord> = BTreeMap::new();
        let mut posted: BTreeMap<u64, PostedFigures> = BTreeMap::new();

        for row in static_rows {
            if row.draw_number == 0 {
                continue;
            }
            posted.insert(
                row.draw_number,
                PostedFigures {
                    ngr: row.ngr_added,
                    singles: row.singles_added,
                },
            );
            let mut rec = DrawRecord::unresolved(row.draw_number, row.date);
            rec.prize_pool = row.prize_pool;
            rec.jackpotted = row.jackpotted;
            rec.posted_ngr_added = row.ngr_added;
            rec.posted_singles_added = row.singles_added;
            rec.prizepool_split = row.prizepool_split.clone();
            rec.total_staked = row.total_staked.unwrap_or(0.0);
            rec.total_tickets = row.total_tickets.unwrap_or(0.0);
            draws.insert(row.draw_number, rec);
        }

        for draw in live {
            if draw.draw_number == 0 {
                continue;
            }
            if !draws.contains_key(&draw.draw_number) {
                let Some(draw_at) = draw.draw_at else {
                    debug!(draw = draw.draw_number, "live draw without date or static row, skipping");
                    continue;
                };
                draws.insert(
                    draw.draw_number,
                    DrawRecord::unresolved(draw.draw_number, draw_at.date_naive()),
                );
            }
            let Some(rec) = draws.get_mut(&draw.draw_number) else {
                continue;
            };

            if draw.prize_pool_amount.is_finite() && draw.prize_pool_amount > 0.0 {
                rec.prize_pool = draw.prize_pool_amount;
            }
            if draw.total_staked.is_finite() && draw.total_staked > 0.0 {
                rec.total_staked = draw.total_staked;
            }
            if let Some(tickets) = draw.total_tickets.filter(|t| t.is_finite() && *t > 0.0) {
                rec.total_tickets = tickets;
            }
            if !draw.status.is_empty() {
                rec.status = DrawStatus::from_feed(&draw.status);
            }
        }

        let before = draws.len();
        draws.retain(|_, rec| rec.prize_pool.is_finite() && rec.prize_pool > 0.0);
        if draws.len() != before {
            debug!(dropped = before - draws.len(), "dropped unresolved draws with empty pool");
        }

        let mut last_split = None;
        for rec in draws.values_mut() {
            match &rec.prizepool_split {
                Some(split) => last_split = Some(split.clone()),
                None => rec.prizepool_split = last_split.clone(),
            }
            if rec.total_tickets <= 0.0 && rec.total_staked > 0.0 {
                rec.total_tickets = (rec.total_staked / params.ticket_cost).floor();
            }
        }

        Self { draws, posted }
    }

    pub fn from_static(static_rows: &[StaticDrawRow], params: &ReconcileParams) -> Self {
        Self::merge(static_rows, &[], params)
    }

    pub fn get_draw(&self, draw_number: u64) -> Option<&DrawRecord> {
        self.draws.get(&draw_number)
    }

    pub fn list_draws(&self, range: DrawRange) -> Vec<&DrawRecord> {
        let lo = range.from.unwrap_or(1);
        let hi = range.to.unwrap_or(u64::MAX);
        self.draws.range(lo..=hi).map(|(_, rec)| rec).collect()
    }

    pub fn draw_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.draws.keys().copied()
    }

    pub fn latest(&self) -> Option<&DrawRecord> {
        self.draws.values().next_back()
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// What `draw_number` posted for its successor, if a static row exists.
    pub fn posted(&self, draw_number: u64) -> Option<PostedFigures> {
        self.posted.get(&draw_number).copied()
    }

    /// Highest draw number with a static row, dropped or not.
    pub fn last_posted(&self) -> Option<u64> {
        self.posted.keys().next_back().copied()
    }

    /// Ordered records plus the posted figures, for the attribution pass.
    pub fn into_parts(self) -> (Vec<DrawRecord>, BTreeMap<u64, PostedFigures>) {
        (self.draws.into_values().collect(), self.posted)
    }
}
