/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Numeric reading in watts or degrees Celsius.
pub type Reading = f64;
