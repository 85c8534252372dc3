use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ReconcileParams;
use crate::error::ReconcileError;
use crate::feeds::CancelToken;
use crate::metrics::{CacheStatus, MetricsCache, PersonalYield, YieldMetrics};
use crate::models::{DrawRange, DrawRecord, PriceQuote};
use crate::reconcile::{SanityChecker, SanityReport, SanityScope};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<MetricsCache>,
    pub sanity: Arc<SanityChecker>,
    pub params: Arc<ReconcileParams>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/timeline", get(get_timeline))
        .route("/api/yield", get(get_yield))
        .route("/api/sanity-check", get(run_sanity_check))
        .route("/api/refresh", post(refresh_now))
        .with_state(state)
}

// ===== Route Handlers =====

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.cache.status();
    Json(HealthResponse {
        status: if cache.has_snapshot { "healthy" } else { "warming" },
        version: env!("CARGO_PKG_VERSION"),
        cache,
    })
}

/// Reconciled timeline, optionally restricted to `from..=to`.
async fn get_timeline(
    State(state): State<AppState>,
    Query(params): Query<TimelineQuery>,
) -> Result<Json<TimelineResponse>, ApiError> {
    let range = DrawRange::new(params.from, params.to)?;
    let snapshot = state.cache.get_or_refresh().await?;
    let draws = snapshot.timeline.range(range);

    Ok(Json(TimelineResponse {
        count: draws.len(),
        draws,
        request_id: snapshot.request_id,
        computed_at: snapshot.computed_at,
    }))
}

/// Headline yield metrics plus the caller's own figures when `staked` is set.
async fn get_yield(
    State(state): State<AppState>,
    Query(params): Query<YieldQuery>,
) -> Result<Json<YieldResponse>, ApiError> {
    let snapshot = state.cache.get_or_refresh().await?;
    let personal = params
        .staked
        .map(|staked| snapshot.personal_yield(staked, &state.params))
        .transpose()?;

    Ok(Json(YieldResponse {
        metrics: snapshot.metrics.clone(),
        personal,
        price: snapshot.price.clone(),
        source_breakdown: snapshot.source_breakdown.clone(),
        request_id: snapshot.request_id,
        computed_at: snapshot.computed_at,
    }))
}

async fn run_sanity_check(
    State(state): State<AppState>,
    Query(params): Query<SanityQuery>,
) -> Result<Json<SanityReport>, ApiError> {
    let scope: SanityScope = params.draws.as_deref().unwrap_or("all").parse()?;
    let report = state.sanity.run(&scope, &CancelToken::new()).await?;
    Ok(Json(report))
}

async fn refresh_now(State(state): State<AppState>) -> Result<Json<CacheStatus>, ApiError> {
    state.cache.refresh().await?;
    Ok(Json(state.cache.status()))
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct TimelineQuery {
    from: Option<u64>,
    to: Option<u64>,
}

#[derive(Deserialize)]
struct YieldQuery {
    /// Personal staked amount in tokens
    staked: Option<f64>,
}

#[derive(Deserialize)]
struct SanityQuery {
    /// "all" or a comma-separated list of draw numbers
    draws: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    cache: CacheStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TimelineResponse {
    count: usize,
    draws: Vec<DrawRecord>,
    request_id: u64,
    computed_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct YieldResponse {
    #[serde(flatten)]
    metrics: YieldMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    personal: Option<PersonalYield>,
    price: PriceQuote,
    source_breakdown: BTreeMap<&'static str, usize>,
    request_id: u64,
    computed_at: DateTime<Utc>,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Reconcile(ReconcileError),
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::Reconcile(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Reconcile(ReconcileError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Reconcile(ReconcileError::InsufficientData { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Reconcile(ReconcileError::UpstreamUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let ApiError::Reconcile(err) = &self;
        if status.is_server_error() {
            tracing::warn!(error = %err, "request failed on upstream");
        }

        let body = Json(json!({
            "error": err.to_string(),
            "kind": err.kind(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ReconcileError::invalid("bad range"), StatusCode::BAD_REQUEST),
            (
                ReconcileError::insufficient(5, "no split"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ReconcileError::upstream("price_feed", "timed out"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            let api_err: ApiError = err.into();
            assert_eq!(api_err.into_response().status(), expected);
        }
    }
}
