//! Periodic publication of live telemetry to stream subscribers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use powerwatch_core::aggregation::Aggregator;
use powerwatch_core::metric_names::{LABEL_CPU_TEMPERATURE, METRIC_CPU_POWER, METRIC_MEMORY_POWER};
use powerwatch_events::{Broker, TelemetryEvent};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::thermal;

/// JSON body of one streamed event.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryPayload {
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
    #[serde(rename = "HostAddress")]
    pub host_address: String,
    #[serde(rename = "CPUTemp")]
    pub cpu_temp: Option<f64>,
    #[serde(rename = "CPUCurrentPowerUsage")]
    pub cpu_current_power: f64,
    #[serde(rename = "MemoryCurrentPowerUsage")]
    pub memory_current_power: f64,
}

/// Everything the publish loop reads from on each tick.
#[derive(Clone)]
pub struct PublishContext {
    pub broker: Broker,
    pub aggregator: Arc<Aggregator>,
    pub host_address: Arc<str>,
    pub thermal_zone_path: String,
}

impl PublishContext {
    /// Assemble the current reading into an event.
    pub async fn build_event(&self) -> Result<TelemetryEvent, serde_json::Error> {
        let payload = TelemetryPayload {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            host_address: self.host_address.to_string(),
            cpu_temp: thermal::read_cpu_temperature(&self.thermal_zone_path).await,
            cpu_current_power: self.aggregator.snapshot(METRIC_CPU_POWER).current,
            memory_current_power: self.aggregator.snapshot(METRIC_MEMORY_POWER).current,
        };
        TelemetryEvent::json(LABEL_CPU_TEMPERATURE, &payload)
    }

    /// Build and publish one event. Encoding failures skip this tick only.
    pub async fn publish_once(&self) {
        match self.build_event().await {
            Ok(event) => self.broker.publish(event),
            Err(e) => tracing::error!(error = %e, "Failed to encode telemetry event, skipping tick"),
        }
    }
}

/// Run the publish loop until `cancel` is triggered.
pub async fn run(ctx: PublishContext, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_ms = period.as_millis() as u64, "Telemetry publishing started");

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Telemetry publishing stopping");
                break;
            }
            _ = interval.tick() => ctx.publish_once().await,
        }
    }
}
