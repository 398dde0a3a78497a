//! Well-known metric keys and stream labels.
//!
//! The aggregator is keyed by these names; the sampling loop and the query
//! handlers must agree on them.

/// CPU package power draw in watts (sum over all sockets).
pub const METRIC_CPU_POWER: &str = "cpu_power_watts";

/// DRAM power draw in watts (sum over all sockets).
pub const METRIC_MEMORY_POWER: &str = "memory_power_watts";

/// Human-readable label written in front of every streamed thermal event.
pub const LABEL_CPU_TEMPERATURE: &str = "CPU Temperature";

/// Marker token identifying the CPU package domain in power tool output.
pub const MARKER_CPU_PACKAGE: &str = "PKG";

/// Marker token identifying the DRAM domain in power tool output.
pub const MARKER_DRAM: &str = "DRAM";

/// Phrase on the line that carries a domain's power figure.
pub const PHRASE_POWER_CONSUMED: &str = "Power consumed";
