use std::str::FromStr;
use std::time::Duration;

use powerwatch_core::aggregation::DEFAULT_WINDOW_SIZE;
use powerwatch_events::broker::{DEFAULT_MAX_MISSED, DEFAULT_QUEUE_CAPACITY};
use powerwatch_events::BrokerConfig;

/// Default external power measurement program.
pub const DEFAULT_POWER_TOOL: &str = "likwid-powermeter";

/// Default arguments: measure for one second.
pub const DEFAULT_POWER_TOOL_ARGS: &str = "-s 1s";

/// Default sysfs file holding the CPU temperature in millidegrees Celsius.
pub const DEFAULT_THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Upper bound for the sampling and publish intervals (one day).
pub const MAX_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single monitored node.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins; empty means any origin.
    pub cors_origins: Vec<String>,
    /// Timeout for producing a response head, in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks, in seconds (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// Overrides discovery of the address stamped into responses.
    pub host_address: Option<String>,
    /// Samples per aggregation window (default: `60`).
    pub window_size: usize,
    /// Seconds between power samples (default: `1`).
    pub sample_interval_secs: u64,
    /// Seconds between streamed events (default: `2`).
    pub publish_interval_secs: u64,
    /// External power measurement program.
    pub power_tool: String,
    /// Arguments passed to `power_tool`.
    pub power_tool_args: Vec<String>,
    /// Kill the power tool if it runs longer than this, in seconds (default: `10`).
    pub power_tool_timeout_secs: u64,
    /// File holding the CPU temperature in millidegrees Celsius.
    pub thermal_zone_path: String,
    /// Bounded delivery queue size per stream subscriber (default: `32`).
    pub subscriber_queue_capacity: usize,
    /// Consecutive dropped events before a stream subscriber is evicted (default: `16`).
    pub subscriber_max_missed: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: Vec::new(),
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            host_address: None,
            window_size: DEFAULT_WINDOW_SIZE,
            sample_interval_secs: 1,
            publish_interval_secs: 2,
            power_tool: DEFAULT_POWER_TOOL.into(),
            power_tool_args: split_args(DEFAULT_POWER_TOOL_ARGS),
            power_tool_timeout_secs: 10,
            thermal_zone_path: DEFAULT_THERMAL_ZONE_PATH.into(),
            subscriber_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            subscriber_max_missed: DEFAULT_MAX_MISSED,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                                  |
    /// |-----------------------------|------------------------------------------|
    /// | `HOST`                      | `0.0.0.0`                                |
    /// | `PORT`                      | `8000`                                   |
    /// | `CORS_ORIGINS`              | *(any origin)*                           |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `10`                                     |
    /// | `HOST_ADDRESS`              | *(discovered)*                           |
    /// | `WINDOW_SIZE`               | `60`                                     |
    /// | `SAMPLE_INTERVAL_SECS`      | `1` (at most `86400`)                    |
    /// | `PUBLISH_INTERVAL_SECS`     | `2` (at most `86400`)                    |
    /// | `POWER_TOOL`                | `likwid-powermeter`                      |
    /// | `POWER_TOOL_ARGS`           | `-s 1s`                                  |
    /// | `POWER_TOOL_TIMEOUT_SECS`   | `10`                                     |
    /// | `THERMAL_ZONE_PATH`         | `/sys/class/thermal/thermal_zone0/temp`  |
    /// | `SUBSCRIBER_QUEUE_CAPACITY` | `32`                                     |
    /// | `SUBSCRIBER_MAX_MISSED`     | `16`                                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        let host_address = lookup("HOST_ADDRESS")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            cors_origins,
            request_timeout_secs: parse_var(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            shutdown_timeout_secs: parse_var(
                &lookup,
                "SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout_secs,
            )?,
            host_address,
            window_size: parse_positive(&lookup, "WINDOW_SIZE", defaults.window_size)?,
            sample_interval_secs: parse_interval(
                &lookup,
                "SAMPLE_INTERVAL_SECS",
                defaults.sample_interval_secs,
            )?,
            publish_interval_secs: parse_interval(
                &lookup,
                "PUBLISH_INTERVAL_SECS",
                defaults.publish_interval_secs,
            )?,
            power_tool: lookup("POWER_TOOL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.power_tool),
            power_tool_args: lookup("POWER_TOOL_ARGS")
                .map(|raw| split_args(&raw))
                .unwrap_or(defaults.power_tool_args),
            power_tool_timeout_secs: parse_positive(
                &lookup,
                "POWER_TOOL_TIMEOUT_SECS",
                defaults.power_tool_timeout_secs,
            )?,
            thermal_zone_path: lookup("THERMAL_ZONE_PATH").unwrap_or(defaults.thermal_zone_path),
            subscriber_queue_capacity: parse_positive(
                &lookup,
                "SUBSCRIBER_QUEUE_CAPACITY",
                defaults.subscriber_queue_capacity,
            )?,
            subscriber_max_missed: parse_positive(
                &lookup,
                "SUBSCRIBER_MAX_MISSED",
                defaults.subscriber_max_missed,
            )?,
        })
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn power_tool_timeout(&self) -> Duration {
        Duration::from_secs(self.power_tool_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            queue_capacity: self.subscriber_queue_capacity,
            max_missed: self.subscriber_max_missed,
        }
    }
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn parse_positive<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    let parsed = parse_var(lookup, var, default)?;
    if parsed <= T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: lookup(var).unwrap_or_default(),
        });
    }
    Ok(parsed)
}

fn parse_interval<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_positive(lookup, var, default)?;
    if secs > MAX_INTERVAL_SECS {
        return Err(ConfigError::Invalid {
            var,
            value: lookup(var).unwrap_or_default(),
        });
    }
    Ok(secs)
}
