//! The unit of data pushed to live subscribers.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// An encoded telemetry payload plus the label it is streamed under.
///
/// Both parts are reference counted, so fanning one event out to many
/// subscribers clones two pointers rather than the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    label: Arc<str>,
    payload: Arc<str>,
}

impl TelemetryEvent {
    pub fn new(label: impl Into<Arc<str>>, payload: impl Into<Arc<str>>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }

    /// Encode `value` as JSON under `label`.
    pub fn json<T: Serialize>(
        label: impl Into<Arc<str>>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_string(value)?;
        Ok(Self::new(label, payload))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Wire form used by the streaming endpoint: the labelled payload
    /// followed by a blank line.
    pub fn to_stream_chunk(&self) -> String {
        format!("{self}\n\n")
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.payload)
    }
}
