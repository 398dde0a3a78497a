//! Powerwatch live telemetry fan-out.
//!
//! - [`Broker`]: handle to the single-owner control loop that keeps the
//!   subscriber registry and fans every published event out to it.
//! - [`SubscriberHandle`]: one subscriber's bounded delivery queue.
//! - [`TelemetryEvent`]: immutable, cheaply clonable payload.

pub mod broker;
pub mod event;

pub use broker::{Broker, BrokerConfig, BrokerError, BrokerStats, SubscriberHandle, SubscriberId};
pub use event::TelemetryEvent;
