use thiserror::Error;

/// Top-level error type for the telemetry service.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Malformed payload for '{event_type}' event: {reason}")]
    MalformedPayload { event_type: String, reason: String },

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Transport setup failed: {0}")]
    Transport(#[from] crate::sender::ClientError),
}

impl TelemetryError {
    /// Whether the service is still usable after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TelemetryError::MalformedPayload { .. })
    }
}
