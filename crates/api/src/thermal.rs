//! CPU temperature from the kernel thermal zone interface.

use std::path::Path;

use powerwatch_core::round2;

/// Read a sysfs thermal zone file (millidegrees Celsius) and return degrees
/// Celsius rounded to two decimals.
///
/// Returns `None` when the file is missing or does not hold an integer; the
/// publish loop then reports the temperature as `null`.
pub async fn read_cpu_temperature(path: impl AsRef<Path>) -> Option<f64> {
    let path = path.as_ref();
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Thermal zone unreadable");
            return None;
        }
    };
    parse_millidegrees(&raw)
}

fn parse_millidegrees(raw: &str) -> Option<f64> {
    let millis: i64 = raw.trim().parse().ok()?;
    Some(round2(millis as f64 / 1000.0))
}
