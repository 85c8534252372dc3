//! The canonical yield function. Every APY or USD yield figure the service
//! exposes (chart points, headline APYs, highest APY, personal yield) comes
//! out of [`compute_yield`].

use serde::{Deserialize, Serialize};

use crate::config::ReconcileParams;
use crate::error::{ReconcileError, ReconcileResult};
use crate::models::PrizeSplit;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YieldFigures {
    #[serde(rename = "weeklyExpectedUSD")]
    pub weekly_expected_usd: f64,
    #[serde(rename = "annualExpectedUSD")]
    pub annual_expected_usd: f64,
    /// Percent, e.g. `12.5` for 12.5%.
    #[serde(rename = "effectiveAPY")]
    pub effective_apy: f64,
    #[serde(rename = "ticketCount")]
    pub ticket_count: u64,
    #[serde(rename = "stakingValueUSD")]
    pub staking_value_usd: f64,
}

/// Fraction of the pool that pays out to ticket holders in expectation.
pub fn yield_share(split: &PrizeSplit, params: &ReconcileParams) -> f64 {
    if params.include_jackpot_tier {
        split.share_where(|_| true)
    } else {
        split.share_where(|i| i != params.jackpot_tier_index)
    }
}

/// `staked = None` uses `params.reference_stake`.
pub fn compute_yield(
    ngr: f64,
    total_tickets: f64,
    price_usd: f64,
    split: &PrizeSplit,
    staked: Option<f64>,
    params: &ReconcileParams,
) -> ReconcileResult<YieldFigures> {
    let staked = staked.unwrap_or(params.reference_stake);
    if !(staked.is_finite() && staked > 0.0) {
        return Err(ReconcileError::invalid(format!("staked amount must be positive, got {staked}")));
    }
    if !(price_usd.is_finite() && price_usd > 0.0) {
        return Err(ReconcileError::invalid(format!("token price must be positive, got {price_usd}")));
    }
    if !(total_tickets.is_finite() && total_tickets > 0.0) {
        return Err(ReconcileError::invalid("network ticket count must be positive"));
    }
    if !(ngr.is_finite() && ngr >= 0.0) {
        return Err(ReconcileError::invalid(format!("NGR must be non-negative, got {ngr}")));
    }

    let ticket_count = (staked / params.ticket_cost).floor();
    let weekly = ticket_count / total_tickets * ngr * yield_share(split, params);
    let annual = weekly * params.weeks_per_year;
    let staking_value_usd = staked * price_usd;

    Ok(YieldFigures {
        weekly_expected_usd: weekly,
        annual_expected_usd: annual,
        effective_apy: annual / staking_value_usd * 100.0,
        ticket_count: ticket_count as u64,
        staking_value_usd,
    })
}
