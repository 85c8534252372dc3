use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ReconcileError;

/// Provenance of a draw's attributed NGR, best first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NgrSource {
    Static,
    Calculated,
    Estimated,
    None,
}

impl NgrSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NgrSource::Static => "static",
            NgrSource::Calculated => "calculated",
            NgrSource::Estimated => "estimated",
            NgrSource::None => "none",
        }
    }

    /// Lower is preferred.
    pub fn rank(&self) -> u8 {
        match self {
            NgrSource::Static => 0,
            NgrSource::Calculated => 1,
            NgrSource::Estimated => 2,
            NgrSource::None => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrawStatus {
    #[default]
    Closed,
    /// Upcoming/open draw; figures are provisional until it closes.
    Open,
}

impl DrawStatus {
    pub fn from_feed(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" | "active" | "pending" | "upcoming" | "running" => DrawStatus::Open,
            _ => DrawStatus::Closed,
        }
    }
}

/// Which rule flagged a jackpot win.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JackpotSignal {
    /// A JACKPOT prize-tier row reported winners.
    PrizeTier,
    /// `jackpotted / prize_pool` dropped under the won ratio.
    RolloverRatio,
}

/// One prize tier of a draw as reported by the draw feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeTier {
    pub category: String,
    /// Currency allocated to the tier this draw.
    #[serde(deserialize_with = "de_f64_lenient")]
    pub amount: f64,
    #[serde(default, deserialize_with = "de_u64_lenient")]
    pub win_count: u64,
    /// Currency actually paid out from the tier.
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub win: f64,
}

impl PrizeTier {
    pub fn is_jackpot(&self) -> bool {
        self.category.trim().eq_ignore_ascii_case("jackpot")
    }
}

/// Ordered tier allocation percentages, wire-encoded as `"30-14-8-9-7-6-5-10-11"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrizeSplit(Vec<f64>);

impl PrizeSplit {
    const SUM_TOLERANCE: f64 = 0.01;

    pub fn new(percentages: Vec<f64>) -> Result<Self, ReconcileError> {
        if percentages.is_empty() {
            return Err(ReconcileError::invalid("prize split is empty"));
        }
        if percentages.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(ReconcileError::invalid(format!(
                "prize split has a negative or non-finite tier: {:?}",
                percentages
            )));
        }
        let sum: f64 = percentages.iter().sum();
        if (sum - 100.0).abs() > Self::SUM_TOLERANCE {
            return Err(ReconcileError::invalid(format!(
                "prize split sums to {sum}, expected 100"
            )));
        }
        Ok(Self(percentages))
    }

    pub fn tiers(&self) -> &[f64] {
        &self.0
    }

    /// Fraction (0..=1) of the pool allocated to tiers accepted by `include`.
    pub fn share_where(&self, include: impl Fn(usize) -> bool) -> f64 {
        self.0
            .iter()
            .enumerate()
            .filter(|(i, _)| include(*i))
            .map(|(_, p)| *p)
            .sum::<f64>()
            / 100.0
    }
}

impl FromStr for PrizeSplit {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split('-')
            .map(|p| {
                p.trim().parse::<f64>().map_err(|_| {
                    ReconcileError::invalid(format!("malformed prize split {s:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parts)
    }
}

impl TryFrom<String> for PrizeSplit {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PrizeSplit> for String {
    fn from(value: PrizeSplit) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PrizeSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|p| format!("{p}"))
            .collect::<Vec<_>>()
            .join("-");
        f.write_str(&joined)
    }
}

/// A reconciled lottery draw.
///
/// `posted_*` fields are what the draw's own row reports (they fund the next
/// draw); `ngr_added`/`singles_added` are what funded this draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawRecord {
    pub draw_number: u64,
    pub date: NaiveDate,
    pub status: DrawStatus,
    pub prize_pool: f64,
    pub jackpotted: Option<f64>,
    pub posted_ngr_added: Option<f64>,
    pub posted_singles_added: Option<f64>,
    pub ngr_added: f64,
    pub singles_added: f64,
    pub ngr_source: NgrSource,
    pub prizepool_split: Option<PrizeSplit>,
    pub total_staked: f64,
    pub total_tickets: f64,
    pub prizes: Option<Vec<PrizeTier>>,
    pub jackpot_won: bool,
    pub jackpot_signal: Option<JackpotSignal>,
    #[serde(rename = "totalNGRContribution")]
    pub total_ngr_contribution: f64,
    #[serde(rename = "adjustedNGR")]
    pub adjusted_ngr: f64,
    pub jackpot_replenishment: f64,
}

impl DrawRecord {
    /// A merged but not yet attributed record.
    pub fn unresolved(draw_number: u64, date: NaiveDate) -> Self {
        Self {
            draw_number,
            date,
            status: DrawStatus::Closed,
            prize_pool: 0.0,
            jackpotted: None,
            posted_ngr_added: None,
            posted_singles_added: None,
            ngr_added: 0.0,
            singles_added: 0.0,
            ngr_source: NgrSource::None,
            prizepool_split: None,
            total_staked: 0.0,
            total_tickets: 0.0,
            prizes: None,
            jackpot_won: false,
            jackpot_signal: None,
            total_ngr_contribution: 0.0,
            adjusted_ngr: 0.0,
            jackpot_replenishment: 0.0,
        }
    }

    /// `jackpotted / prize_pool`, when both are known.
    pub fn rollover_ratio(&self) -> Option<f64> {
        let jackpotted = self.jackpotted?;
        (self.prize_pool > 0.0).then(|| jackpotted / self.prize_pool)
    }
}

/// Inclusive draw-number range; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRange {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl DrawRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(from: Option<u64>, to: Option<u64>) -> Result<Self, ReconcileError> {
        if from == Some(0) || to == Some(0) {
            return Err(ReconcileError::invalid("draw numbers start at 1"));
        }
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(ReconcileError::invalid(format!(
                    "range start {f} is after range end {t}"
                )));
            }
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, draw_number: u64) -> bool {
        self.from.map_or(true, |f| draw_number >= f) && self.to.map_or(true, |t| draw_number <= t)
    }
}

/// Current token price from the price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub usd: f64,
    pub usd_24h_change: Option<f64>,
    pub as_of: DateTime<Utc>,
}

/// Per-draw figures returned by the live draw feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveDraw {
    #[serde(default, alias = "drawId", alias = "id")]
    pub draw_number: u64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub prize_pool_amount: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub total_staked: f64,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub total_tickets: Option<f64>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub draw_at: Option<DateTime<Utc>>,
}

/// One row of the version-controlled historical dataset. `ngr_added` and
/// `singles_added` are the values posted in that row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticDrawRow {
    pub draw_number: u64,
    pub date: NaiveDate,
    #[serde(deserialize_with = "de_f64_lenient")]
    pub prize_pool: f64,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub jackpotted: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub ngr_added: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub singles_added: Option<f64>,
    #[serde(default)]
    pub prizepool_split: Option<PrizeSplit>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub total_staked: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub total_tickets: Option<f64>,
}

// Feeds are inconsistent about quoting numbers; accept both.
fn de_opt_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => {
            let s = s.trim().replace(',', "");
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        other => Err(serde::de::Error::custom(format!(
            "expected number, got {other}"
        ))),
    }
}

fn de_f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_f64_lenient(deserializer)?.unwrap_or(0.0))
}

fn de_u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = de_opt_f64_lenient(deserializer)?.unwrap_or(0.0);
    if v < 0.0 || !v.is_finite() || v.fract() != 0.0 || v > u64::MAX as f64 {
        return Err(serde::de::Error::custom(format!("invalid count {v}")));
    }
    Ok(v as u64)
}
