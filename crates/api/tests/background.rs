//! Integration tests for the sampling and publish loops.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use powerwatch_api::background::publish::PublishContext;
use powerwatch_api::background::{publish, sampling};
use powerwatch_api::collector::{CollectError, PowerSource};
use powerwatch_core::aggregation::Aggregator;
use powerwatch_core::metric_names::{METRIC_CPU_POWER, METRIC_MEMORY_POWER};
use powerwatch_core::power_report::PowerReading;
use powerwatch_events::{Broker, BrokerConfig};
use tokio_util::sync::CancellationToken;

/// Replays a scripted list of results, then keeps failing.
struct ScriptedSource {
    results: Mutex<VecDeque<Result<PowerReading, CollectError>>>,
}

impl ScriptedSource {
    fn new(results: Vec<Result<PowerReading, CollectError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
        }
    }
}

#[async_trait]
impl PowerSource for ScriptedSource {
    async fn sample(&self) -> Result<PowerReading, CollectError> {
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CollectError::NoReadings))
    }
}

fn reading(cpu: Option<f64>, memory: Option<f64>) -> PowerReading {
    PowerReading {
        cpu_watts: cpu,
        memory_watts: memory,
        skipped_lines: 0,
    }
}

// ---------------------------------------------------------------------------
// Test: a successful sample feeds both metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sample_once_records_both_domains() {
    let source = ScriptedSource::new(vec![Ok(reading(Some(42.5), Some(7.25)))]);
    let aggregator = Aggregator::new(60).unwrap();

    sampling::sample_once(&source, &aggregator).await.unwrap();

    assert_eq!(aggregator.snapshot(METRIC_CPU_POWER).current, 42.5);
    assert_eq!(aggregator.snapshot(METRIC_MEMORY_POWER).current, 7.25);
    assert!(aggregator.last_updated().is_some());
}

// ---------------------------------------------------------------------------
// Test: failures and missing domains keep the previous values
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_or_partial_samples_keep_previous_values() {
    let source = ScriptedSource::new(vec![
        Ok(reading(Some(40.0), Some(6.0))),
        Err(CollectError::Timeout { timeout_ms: 10_000 }),
        Ok(reading(Some(41.0), None)),
    ]);
    let aggregator = Aggregator::new(60).unwrap();

    sampling::sample_once(&source, &aggregator).await.unwrap();
    assert_matches!(
        sampling::sample_once(&source, &aggregator).await,
        Err(CollectError::Timeout { timeout_ms: 10_000 })
    );
    assert_eq!(aggregator.snapshot(METRIC_CPU_POWER).current, 40.0);

    sampling::sample_once(&source, &aggregator).await.unwrap();
    assert_eq!(aggregator.snapshot(METRIC_CPU_POWER).current, 41.0);
    assert_eq!(aggregator.snapshot(METRIC_MEMORY_POWER).current, 6.0);
}

// ---------------------------------------------------------------------------
// Test: the loop survives failures and stops on cancel
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn sampling_loop_survives_failures_and_stops_on_cancel() {
    let source: Arc<dyn PowerSource> = Arc::new(ScriptedSource::new(vec![
        Err(CollectError::NoReadings),
        Ok(reading(Some(30.0), Some(5.0))),
        Err(CollectError::Failed {
            code: 1,
            stderr: "no RAPL access".into(),
        }),
    ]));
    let aggregator = Arc::new(Aggregator::new(60).unwrap());
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(sampling::run(
        source,
        Arc::clone(&aggregator),
        Duration::from_secs(1),
        cancel.clone(),
    ));

    // Ticks at t=0, 1 and 2 consume all three scripted results.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(aggregator.snapshot(METRIC_CPU_POWER).current, 30.0);
    assert_eq!(aggregator.snapshot(METRIC_MEMORY_POWER).current, 5.0);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sampling loop should stop after cancel")
        .unwrap();
}

// ---------------------------------------------------------------------------
// Test: the publish loop emits JSON events labelled for the stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_once_emits_current_reading() {
    let (broker, _control) = Broker::start(BrokerConfig::default());
    let aggregator = Arc::new(Aggregator::new(60).unwrap());
    aggregator.observe(METRIC_CPU_POWER, 55.123);
    aggregator.observe(METRIC_MEMORY_POWER, 4.0);

    let ctx = PublishContext {
        broker: broker.clone(),
        aggregator,
        host_address: "10.0.75.74".into(),
        thermal_zone_path: "/nonexistent/powerwatch/thermal_zone/temp".into(),
    };
    let mut sub = broker.subscribe().await.unwrap();

    ctx.publish_once().await;

    let event = sub.recv().await.unwrap();
    assert_eq!(event.label(), "CPU Temperature");

    let payload: serde_json::Value = serde_json::from_str(event.payload()).unwrap();
    assert_eq!(payload["HostAddress"], "10.0.75.74");
    assert_eq!(payload["CPUCurrentPowerUsage"], 55.12);
    assert_eq!(payload["MemoryCurrentPowerUsage"], 4.0);
    assert!(payload["CPUTemp"].is_null(), "missing sensor is reported as null");
    assert!(payload["TimeStamp"].is_string());
}

#[tokio::test(start_paused = true)]
async fn publish_loop_ticks_until_cancelled() {
    let (broker, _control) = Broker::start(BrokerConfig::default());
    let ctx = PublishContext {
        broker: broker.clone(),
        aggregator: Arc::new(Aggregator::new(60).unwrap()),
        host_address: "".into(),
        thermal_zone_path: "/nonexistent/powerwatch/thermal_zone/temp".into(),
    };
    let mut sub = broker.subscribe().await.unwrap();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(publish::run(ctx, Duration::from_secs(2), cancel.clone()));

    // Ticks at t=0 and t=2.
    assert!(sub.recv().await.is_some());
    assert!(sub.recv().await.is_some());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("publish loop should stop after cancel")
        .unwrap();

    let stats = broker.stats().await.unwrap();
    assert_eq!(stats.published, 2);
}
