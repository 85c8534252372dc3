//! Draw feed REST client.
//!
//! Per-draw pool/staking figures plus prize-tier results.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::models::{LiveDraw, PrizeTier};

#[async_trait::async_trait]
pub trait DrawFeed: Send + Sync {
    async fn get_draw(&self, draw_id: u64) -> Result<LiveDraw>;

    async fn get_prizes_and_results(&self, draw_id: u64) -> Result<Vec<PrizeTier>>;

    async fn get_latest_draw_id(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct DrawApiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestDrawResponse {
    #[serde(alias = "drawId", alias = "id")]
    latest_draw_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PrizesResponse {
    Wrapped { prizes: Vec<PrizeTier> },
    Bare(Vec<PrizeTier>),
}

impl DrawApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent("DrawYield/1.0")
            .build()
            .context("Failed to build DrawApiClient")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("GET {} {}: {}", path, status, text));
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to parse {path} response"))
    }
}

#[async_trait::async_trait]
impl DrawFeed for DrawApiClient {
    async fn get_draw(&self, draw_id: u64) -> Result<LiveDraw> {
        let mut draw: LiveDraw = self.get_json(&format!("/draws/{draw_id}")).await?;
        // Some deployments omit the id in the body.
        draw.draw_number = draw_id;
        Ok(draw)
    }

    async fn get_prizes_and_results(&self, draw_id: u64) -> Result<Vec<PrizeTier>> {
        let resp: PrizesResponse = self
            .get_json(&format!("/draws/{draw_id}/prizes"))
            .await?;
        let prizes = match resp {
            PrizesResponse::Wrapped { prizes } => prizes,
            PrizesResponse::Bare(prizes) => prizes,
        };
        debug!(draw_id, tiers = prizes.len(), "prize tiers received");
        Ok(prizes)
    }

    async fn get_latest_draw_id(&self) -> Result<u64> {
        let resp: LatestDrawResponse = self.get_json("/draws/latest").await?;
        if resp.latest_draw_id == 0 {
            anyhow::bail!("draw feed reported latest draw id 0");
        }
        Ok(resp.latest_draw_id)
    }
}
