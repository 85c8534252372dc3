//! Jackpot detection and replenishment adjustment.
//!
//! After a jackpot is paid out, the following draw refills the jackpot tier.
//! That refill inflates apparent NGR for one period, so it is subtracted out to
//! give the yield-bearing `adjusted_ngr`.

use crate::config::ReconcileParams;
use crate::models::{DrawRecord, JackpotSignal, PrizeTier};

/// Authoritative prize-tier signal first, rollover-ratio heuristic second.
pub fn detect_jackpot(
    prizes: Option<&[PrizeTier]>,
    jackpotted: Option<f64>,
    prize_pool: f64,
    params: &ReconcileParams,
) -> Option<JackpotSignal> {
    if let Some(tiers) = prizes {
        if tiers.iter().any(|t| t.is_jackpot() && t.win_count > 0) {
            return Some(JackpotSignal::PrizeTier);
        }
    }

    let jackpotted = jackpotted?;
    if prize_pool > 0.0 && jackpotted / prize_pool < params.jackpot_won_ratio {
        return Some(JackpotSignal::RolloverRatio);
    }
    None
}

/// `(jackpot_replenishment, adjusted_ngr)` for a draw whose predecessor's
/// jackpot state is known.
pub fn replenishment_adjustment(
    total_contribution: f64,
    jackpotted: Option<f64>,
    previous: Option<&DrawRecord>,
) -> (f64, f64) {
    let replenishment = match previous {
        Some(prev) if prev.jackpot_won => match (jackpotted, prev.jackpotted) {
            (Some(now), Some(before)) => (now - before).max(0.0),
            _ => 0.0,
        },
        _ => 0.0,
    };

    if replenishment > 0.0 {
        (replenishment, (total_contribution - replenishment).max(0.0))
    } else {
        (0.0, total_contribution)
    }
}

/// Flag wins and compute adjusted NGR over an ordered, attributed timeline.
pub fn apply_jackpot_adjustments(records: &mut [DrawRecord], params: &ReconcileParams) {
    for rec in records.iter_mut() {
        let signal = detect_jackpot(rec.prizes.as_deref(), rec.jackpotted, rec.prize_pool, params);
        rec.jackpot_signal = signal;
        rec.jackpot_won = signal.is_some();
    }

    for i in 0..records.len() {
        let (before, rest) = records.split_at_mut(i);
        let rec = &mut rest[0];
        let draw_number = rec.draw_number;
        // Only the immediately preceding draw number counts.
        let previous = before.last().filter(|p| p.draw_number + 1 == draw_number);

        let (replenishment, adjusted) =
            replenishment_adjustment(rec.total_ngr_contribution, rec.jackpotted, previous);
        rec.jackpot_replenishment = replenishment;
        rec.adjusted_ngr = adjusted;
    }
}
