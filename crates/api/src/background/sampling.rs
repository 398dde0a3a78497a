//! Periodic power sampling into the windowed aggregator.
//!
//! One tick runs the [`PowerSource`] to completion and feeds whatever
//! domains it reported into the [`Aggregator`]. A failed tick is logged and
//! the previous snapshot stays in place until the next successful one.

use std::sync::Arc;
use std::time::Duration;

use powerwatch_core::aggregation::Aggregator;
use powerwatch_core::metric_names::{METRIC_CPU_POWER, METRIC_MEMORY_POWER};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::collector::{CollectError, PowerSource};

/// Take one sample and record it.
///
/// A domain missing from the reading is left untouched, so its last value
/// keeps being served.
pub async fn sample_once(
    source: &dyn PowerSource,
    aggregator: &Aggregator,
) -> Result<(), CollectError> {
    let reading = source.sample().await?;

    if let Some(watts) = reading.cpu_watts {
        if !aggregator.observe(METRIC_CPU_POWER, watts) {
            tracing::warn!(watts, "Ignoring non-finite CPU power sample");
        }
    }
    if let Some(watts) = reading.memory_watts {
        if !aggregator.observe(METRIC_MEMORY_POWER, watts) {
            tracing::warn!(watts, "Ignoring non-finite memory power sample");
        }
    }

    tracing::debug!(
        cpu_watts = ?reading.cpu_watts,
        memory_watts = ?reading.memory_watts,
        "Power sample recorded"
    );
    Ok(())
}

/// Run the sampling loop until `cancel` is triggered.
///
/// A sample already in progress when cancellation arrives is allowed to
/// finish.
pub async fn run(
    source: Arc<dyn PowerSource>,
    aggregator: Arc<Aggregator>,
    period: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_ms = period.as_millis() as u64, "Power sampling started");

    let mut interval = tokio::time::interval(period);
    // The tool itself takes about one period; don't burst to catch up.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Power sampling stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = sample_once(source.as_ref(), &aggregator).await {
                    tracing::error!(error = %e, "Power sampling failed, keeping previous values");
                }
            }
        }
    }
}
