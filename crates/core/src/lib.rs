//! Powerwatch domain logic.
//!
//! Everything in this crate is runtime-agnostic: the windowed aggregator,
//! the power tool report parser and host address discovery. The HTTP layer
//! and background tasks live in `powerwatch-api`.

pub mod aggregation;
pub mod error;
pub mod host;
pub mod metric_names;
pub mod power_report;
pub mod types;

/// Round to two decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
