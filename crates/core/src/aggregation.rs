//! Windowed statistics over a noisy sample stream.
//!
//! [`WindowedStat`] tracks one metric over fixed-size, non-overlapping
//! windows: `current` follows every sample, `min`/`max` are scoped to the
//! active window, and `average` is refreshed once per completed window.
//!
//! [`Aggregator`] owns one `WindowedStat` per metric key behind a single
//! `RwLock`. The sampling task is the only writer; query handlers take
//! read-locked snapshots, so a reader never sees a half-applied sample.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use serde::Serialize;

use crate::error::CoreError;
use crate::round2;
use crate::types::{Reading, Timestamp};

/// Default number of samples per window (one minute at 1 Hz).
pub const DEFAULT_WINDOW_SIZE: usize = 60;

/// Point-in-time view of a [`WindowedStat`], rounded to two decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatSnapshot {
    pub current: Reading,
    pub average: Reading,
    pub min: Reading,
    pub max: Reading,
}

/// Running statistics for a single metric.
#[derive(Debug, Clone)]
pub struct WindowedStat {
    current: Reading,
    min: Reading,
    max: Reading,
    average: Reading,
    window_size: usize,
    sample_count: usize,
    accumulator: Reading,
}

impl WindowedStat {
    /// Zeroed stat.
    ///
    /// Returns [`CoreError::Validation`] when `window_size` is zero, since
    /// such a window would never complete.
    pub fn new(window_size: usize) -> Result<Self, CoreError> {
        if window_size == 0 {
            return Err(CoreError::Validation(
                "window size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            current: 0.0,
            min: 0.0,
            max: 0.0,
            average: 0.0,
            window_size,
            sample_count: 0,
            accumulator: 0.0,
        })
    }

    /// Record one sample.
    ///
    /// Non-finite values (NaN, ±inf) are rejected and leave the stat
    /// untouched; returns `false` in that case.
    pub fn observe(&mut self, value: Reading) -> bool {
        if !value.is_finite() {
            return false;
        }

        self.current = value;
        if self.sample_count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        self.accumulator += value;
        self.sample_count += 1;

        if self.sample_count == self.window_size {
            self.average = self.accumulator / self.window_size as Reading;
            // min/max stay visible until the next sample reseeds them.
            self.accumulator = 0.0;
            self.sample_count = 0;
        }

        true
    }

    /// Rounded view of the current values.
    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            current: round2(self.current),
            average: round2(self.average),
            min: round2(self.min),
            max: round2(self.max),
        }
    }

    /// Samples accumulated in the active window (`0..window_size`).
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

#[derive(Debug)]
struct AggregatorInner {
    stats: HashMap<String, WindowedStat>,
    last_updated: Option<Timestamp>,
}

/// Thread-safe collection of [`WindowedStat`]s keyed by metric name.
///
/// Designed to be wrapped in `Arc` and shared between the sampling task and
/// the HTTP handlers.
#[derive(Debug)]
pub struct Aggregator {
    /// Zeroed stat cloned for each new metric.
    template: WindowedStat,
    inner: RwLock<AggregatorInner>,
}

impl Aggregator {
    /// Create an empty aggregator.
    ///
    /// Returns [`CoreError::Validation`] when `window_size` is zero.
    pub fn new(window_size: usize) -> Result<Self, CoreError> {
        Ok(Self {
            template: WindowedStat::new(window_size)?,
            inner: RwLock::new(AggregatorInner {
                stats: HashMap::new(),
                last_updated: None,
            }),
        })
    }

    /// Record one sample for `metric`. Unknown metrics are created on first use.
    ///
    /// Returns `false` (and changes nothing) for non-finite input.
    pub fn observe(&self, metric: &str, value: Reading) -> bool {
        if !value.is_finite() {
            return false;
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let template = &self.template;
        let accepted = inner
            .stats
            .entry(metric.to_string())
            .or_insert_with(|| template.clone())
            .observe(value);
        if accepted {
            inner.last_updated = Some(Utc::now());
        }
        accepted
    }

    /// Rounded snapshot for `metric`, or all zeros if it was never observed.
    pub fn snapshot(&self, metric: &str) -> StatSnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .stats
            .get(metric)
            .map(WindowedStat::snapshot)
            .unwrap_or_default()
    }

    /// When the last sample (for any metric) was accepted.
    pub fn last_updated(&self) -> Option<Timestamp> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_updated
    }
}
