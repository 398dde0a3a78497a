use std::sync::Arc;

use powerwatch_core::aggregation::Aggregator;
use powerwatch_events::Broker;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Windowed power statistics fed by the sampling loop.
    pub aggregator: Arc<Aggregator>,
    /// Handle to the live event broker.
    pub broker: Broker,
    /// Address stamped into every response; empty when none was found.
    pub host_address: Arc<str>,
}
