use axum::extract::State;
use axum::{routing::get, Json, Router};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::state::AppState;

/// A sample older than this many sampling intervals marks the service degraded.
const STALE_AFTER_INTERVALS: i64 = 3;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Open stream connections; zero once the broker has stopped.
    pub subscribers: usize,
    /// When the last power sample was accepted.
    pub last_sample_at: Option<DateTime<Utc>>,
}

/// GET /health -- returns service, sampler and broker health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let subscribers = state.broker.subscriber_count().await;
    let last_sample_at = state.aggregator.last_updated();

    let sampling_healthy = match (last_sample_at, stale_after(state.config.sample_interval_secs)) {
        (Some(at), Some(limit)) => Utc::now() - at <= limit,
        _ => false,
    };

    let status = if sampling_healthy && subscribers.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        subscribers: subscribers.unwrap_or(0),
        last_sample_at,
    })
}

/// How old the last sample may be before sampling counts as stalled.
///
/// `None` when the window does not fit in a [`TimeDelta`].
fn stale_after(sample_interval_secs: u64) -> Option<TimeDelta> {
    let secs = i64::try_from(sample_interval_secs)
        .ok()?
        .checked_mul(STALE_AFTER_INTERVALS)?;
    TimeDelta::try_seconds(secs)
}

/// Mount health check routes (intended for root level, NOT under `/redfish/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
