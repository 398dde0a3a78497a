//! Handlers for the power snapshot endpoints.
//!
//! Both read the shared [`Aggregator`](powerwatch_core::aggregation::Aggregator)
//! and always answer with the best available figures, even if they are stale
//! or still zero because no sample has arrived yet. Only a serialization
//! failure turns into an error response.

use axum::extract::State;
use axum::response::Response;
use chrono::{SecondsFormat, Utc};
use powerwatch_core::aggregation::StatSnapshot;
use powerwatch_core::metric_names::{METRIC_CPU_POWER, METRIC_MEMORY_POWER};
use serde::Serialize;

use crate::error::AppResult;
use crate::response;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CpuPowerResponse {
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "HostAddress")]
    pub host_address: String,
    #[serde(rename = "CPUCurrentPowerUsage")]
    pub current: f64,
    #[serde(rename = "CPUAveragePowerUsage")]
    pub average: f64,
    #[serde(rename = "CPUMinPowerUsage")]
    pub min: f64,
    #[serde(rename = "CPUMaxPowerUsage")]
    pub max: f64,
}

#[derive(Debug, Serialize)]
pub struct MemoryPowerResponse {
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "HostAddress")]
    pub host_address: String,
    #[serde(rename = "MemoryCurrentPowerUsage")]
    pub current: f64,
    #[serde(rename = "MemoryAveragePowerUsage")]
    pub average: f64,
    #[serde(rename = "MemoryMinPowerUsage")]
    pub min: f64,
    #[serde(rename = "MemoryMaxPowerUsage")]
    pub max: f64,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /redfish/v1/Systems/1/Processors/Power
pub async fn cpu_power(State(state): State<AppState>) -> AppResult<Response> {
    let StatSnapshot {
        current,
        average,
        min,
        max,
    } = state.aggregator.snapshot(METRIC_CPU_POWER);

    response::json(&CpuPowerResponse {
        time: now_rfc3339(),
        host_address: state.host_address.to_string(),
        current,
        average,
        min,
        max,
    })
}

/// GET /redfish/v1/Systems/1/Memory/Power
pub async fn memory_power(State(state): State<AppState>) -> AppResult<Response> {
    let StatSnapshot {
        current,
        average,
        min,
        max,
    } = state.aggregator.snapshot(METRIC_MEMORY_POWER);

    response::json(&MemoryPowerResponse {
        time: now_rfc3339(),
        host_address: state.host_address.to_string(),
        current,
        average,
        min,
        max,
    })
}
