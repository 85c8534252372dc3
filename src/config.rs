//! Runtime configuration.
//!
//! Connection settings come from the environment (`.env` supported). Business
//! constants live in [`ReconcileParams`] and can be overridden from a TOML file
//! pointed to by `DRAWYIELD_PARAMS_PATH`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_DRAW_API_BASE: &str = "https://api.drawyield.io/v1";
const DEFAULT_PRICE_API_BASE: &str = "https://api.coingecko.com/api/v3";

/// Tunable constants of the reconciliation and yield math.
///
/// The jackpot ratio and the estimated allocation ratio are heuristics pending
/// business-rule confirmation, so both are overridable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileParams {
    /// Share of singles that converts into NGR (the rest is platform margin).
    pub singles_conversion_rate: f64,
    /// Fixed ratio of total NGR allocated to this reward pool, used for the
    /// last-resort estimate `prize_pool * ratio`.
    pub estimated_allocation_ratio: f64,
    /// `jackpotted / prize_pool` below this means the jackpot was paid out.
    pub jackpot_won_ratio: f64,
    /// Tokens staked per ticket.
    pub ticket_cost: f64,
    pub weeks_per_year: f64,
    /// Stake used for network-level APY figures when no personal stake is given.
    pub reference_stake: f64,
    /// Index of the jackpot tier inside the prize split.
    pub jackpot_tier_index: usize,
    /// Whether the jackpot tier allocation counts toward expected weekly yield.
    pub include_jackpot_tier: bool,
    /// Estimate draw 1 as `prize_pool * estimated_allocation_ratio` instead of
    /// attributing nothing.
    pub estimate_first_draw: bool,
    /// Number of draws averaged for the "prior weeks" APY comparison.
    pub prior_window: usize,
}

impl Default for ReconcileParams {
    fn default() -> Self {
        Self {
            singles_conversion_rate: 0.85,
            estimated_allocation_ratio: 0.15,
            jackpot_won_ratio: 0.10,
            ticket_cost: 100.0,
            weeks_per_year: 52.0,
            reference_stake: 100_000.0,
            jackpot_tier_index: 0,
            include_jackpot_tier: false,
            estimate_first_draw: false,
            prior_window: 4,
        }
    }
}

impl ReconcileParams {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let params: Self = toml::from_str(raw).context("parse reconcile params TOML")?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read params file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let ratios = [
            ("singles_conversion_rate", self.singles_conversion_rate),
            ("estimated_allocation_ratio", self.estimated_allocation_ratio),
            ("jackpot_won_ratio", self.jackpot_won_ratio),
        ];
        for (name, v) in ratios {
            if !(0.0..=1.0).contains(&v) {
                anyhow::bail!("{name} must be within [0, 1], got {v}");
            }
        }
        if !(self.ticket_cost > 0.0) {
            anyhow::bail!("ticket_cost must be positive, got {}", self.ticket_cost);
        }
        if !(self.weeks_per_year > 0.0) {
            anyhow::bail!("weeks_per_year must be positive");
        }
        if !(self.reference_stake >= self.ticket_cost) {
            anyhow::bail!("reference_stake must buy at least one ticket");
        }
        if self.prior_window == 0 {
            anyhow::bail!("prior_window must be at least 1");
        }
        Ok(())
    }
}

/// Upstream fetch behaviour shared by the refresh pipeline and the audit.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub request_timeout: Duration,
    pub batch_size: usize,
    pub prize_cache_ttl: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            batch_size: 10,
            prize_cache_ttl: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub draw_api_base: String,
    pub price_api_base: String,
    pub price_coin_id: String,
    pub static_dataset_path: PathBuf,
    pub cache_ttl: Duration,
    pub refresh_interval: Duration,
    pub fetch: FetchSettings,
    pub params: ReconcileParams,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let port = env_or("PORT", 8080u16);
        let draw_api_base =
            std::env::var("DRAW_API_BASE").unwrap_or_else(|_| DEFAULT_DRAW_API_BASE.to_string());
        let price_api_base = std::env::var("PRICE_API_BASE")
            .unwrap_or_else(|_| DEFAULT_PRICE_API_BASE.to_string());
        let price_coin_id =
            std::env::var("PRICE_COIN_ID").unwrap_or_else(|_| "drawyield".to_string());
        let static_dataset_path = std::env::var("STATIC_DRAWS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/draws.json"));

        let timeout_secs = env_or("UPSTREAM_TIMEOUT_SECS", 5u64);
        if !(3..=5).contains(&timeout_secs) {
            warn!(
                timeout_secs,
                "UPSTREAM_TIMEOUT_SECS outside the recommended 3-5s window"
            );
        }
        let fetch = FetchSettings {
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            batch_size: env_or("FETCH_BATCH_SIZE", 10usize).clamp(1, 32),
            prize_cache_ttl: Duration::from_secs(env_or("PRIZE_CACHE_TTL_SECS", 600u64)),
        };

        let cache_ttl = Duration::from_secs(env_or("METRICS_CACHE_TTL_SECS", 300u64).clamp(60, 3600));
        let refresh_interval =
            Duration::from_secs(env_or("METRICS_REFRESH_SECS", cache_ttl.as_secs()));

        let params = match std::env::var("DRAWYIELD_PARAMS_PATH") {
            Ok(path) if !path.trim().is_empty() => {
                let params = ReconcileParams::from_toml_file(Path::new(path.trim()))?;
                info!(path = %path, "loaded reconcile params override");
                params
            }
            _ => ReconcileParams::default(),
        };

        Ok(Self {
            port,
            draw_api_base,
            price_api_base,
            price_coin_id,
            static_dataset_path,
            cache_ttl,
            refresh_interval,
            fetch,
            params,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
