use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::PriceQuote;

#[async_trait::async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_current_price(&self) -> Result<PriceQuote>;
}

/// CoinGecko-style `simple/price` client for the staking token.
#[derive(Clone)]
pub struct PriceApiClient {
    client: Client,
    base_url: String,
    coin_id: String,
}

#[derive(Debug, Deserialize)]
struct SimplePriceEntry {
    usd: f64,
    #[serde(default)]
    usd_24h_change: Option<f64>,
    #[serde(default)]
    last_updated_at: Option<i64>,
}

impl PriceApiClient {
    pub fn new(base_url: impl Into<String>, coin_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("DrawYield/1.0")
            .build()
            .context("Failed to build PriceApiClient")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            coin_id: coin_id.into(),
        })
    }
}

#[async_trait::async_trait]
impl PriceFeed for PriceApiClient {
    async fn get_current_price(&self) -> Result<PriceQuote> {
        let url = format!("{}/simple/price", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("ids", self.coin_id.as_str()),
                ("vs_currencies", "usd"),
                ("include_24hr_change", "true"),
                ("include_last_updated_at", "true"),
            ])
            .send()
            .await
            .context("GET /simple/price failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("GET /simple/price {}: {}", status, text));
        }

        let body: HashMap<String, SimplePriceEntry> = resp
            .json()
            .await
            .context("Failed to parse simple/price response")?;
        quote_from_entry(&self.coin_id, body)
    }
}

fn quote_from_entry(coin_id: &str, mut body: HashMap<String, SimplePriceEntry>) -> Result<PriceQuote> {
    let entry = body
        .remove(coin_id)
        .with_context(|| format!("price feed has no entry for {coin_id}"))?;
    if !entry.usd.is_finite() || entry.usd <= 0.0 {
        anyhow::bail!("price feed returned non-positive price {}", entry.usd);
    }
    let as_of = entry
        .last_updated_at
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    Ok(PriceQuote {
        usd: entry.usd,
        usd_24h_change: entry.usd_24h_change,
        as_of,
    })
}
