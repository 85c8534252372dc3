//! DrawYield backend server.
//!
//! Serves the reconciled draw timeline, the yield metrics snapshot and the
//! NGR sanity audit over HTTP, refreshing the snapshot in the background.

use anyhow::{Context, Result};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drawyield_backend::api::{create_router, AppState};
use drawyield_backend::config::AppConfig;
use drawyield_backend::feeds::{
    load_static_dataset, DrawApiClient, DrawFeed, PriceApiClient, PriceFeed, PrizeFetcher,
};
use drawyield_backend::metrics::{MetricsCache, MetricsPipeline};
use drawyield_backend::reconcile::SanityChecker;

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        draw_api = %config.draw_api_base,
        price_api = %config.price_api_base,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "DrawYield backend starting"
    );

    let static_rows = Arc::new(load_static_dataset(&config.static_dataset_path)?);
    info!(
        draws = static_rows.len(),
        path = %config.static_dataset_path.display(),
        "static dataset loaded"
    );

    let draw_feed: Arc<dyn DrawFeed> = Arc::new(DrawApiClient::new(config.draw_api_base.clone())?);
    let price_feed: Arc<dyn PriceFeed> = Arc::new(PriceApiClient::new(
        config.price_api_base.clone(),
        config.price_coin_id.clone(),
    )?);
    let prizes = Arc::new(PrizeFetcher::new(draw_feed.clone(), config.fetch.clone()));

    let pipeline = Arc::new(MetricsPipeline::new(
        draw_feed,
        price_feed,
        prizes.clone(),
        static_rows.clone(),
        config.fetch.clone(),
        config.params.clone(),
    ));
    let cache = Arc::new(MetricsCache::new(pipeline, config.cache_ttl));
    let sanity = Arc::new(SanityChecker::new(prizes, &static_rows, config.params.clone()));

    // Warm the cache; readers get an explicit error until this succeeds.
    match cache.refresh().await {
        Ok(snapshot) => info!(
            request_id = snapshot.request_id,
            draws = snapshot.timeline.len(),
            current_apy = snapshot.metrics.current_apy,
            "initial metrics computed"
        ),
        Err(e) => warn!(error = %e, "initial metrics refresh failed, retrying in background"),
    }
    cache.clone().spawn_refresh_loop(config.refresh_interval);

    let state = AppState {
        cache,
        sanity,
        params: Arc::new(config.params.clone()),
    };
    let app: Router = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("API server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server stopped");
        return Err(e).context("Server error");
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drawyield_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // cwd + parents first, then the crate root when launched from elsewhere.
    let _ = dotenv::dotenv();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
