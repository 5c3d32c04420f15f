//! Reads newline-delimited JSON events and hands them to a telemetry service.

use crate::domain::TelemetryError;
use crate::sender::Transport;
use crate::telemetry::TelemetryService;
use anyhow::Context;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RelayLineError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("line must be a JSON object")]
    NotAnObject,
    #[error("missing string field 'event_type'")]
    MissingEventType,
    #[error("'page_url' must be a string")]
    InvalidPageUrl,
    #[error(transparent)]
    Rejected(#[from] TelemetryError),
}

/// One decoded input line.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayLine {
    pub event_type: String,
    pub page_url: Option<String>,
    pub payload: Map<String, Value>,
}

impl RelayLine {
    pub fn parse(line: &str) -> Result<Self, RelayLineError> {
        let Value::Object(mut payload) = serde_json::from_str::<Value>(line)? else {
            return Err(RelayLineError::NotAnObject);
        };

        let event_type = match payload.remove("event_type") {
            Some(Value::String(event_type)) if !event_type.is_empty() => event_type,
            _ => return Err(RelayLineError::MissingEventType),
        };

        let page_url = match payload.remove("page_url") {
            None => None,
            Some(Value::String(path)) => Some(path),
            Some(_) => return Err(RelayLineError::InvalidPageUrl),
        };

        Ok(Self {
            event_type,
            page_url,
            payload,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Non-blank lines read.
    pub lines_read: u64,
    /// Lines handed to the service.
    pub events_tracked: u64,
    pub lines_rejected: u64,
    /// Stopped by the cancellation token rather than end of input.
    pub interrupted: bool,
}

/// Relays every line of `reader` until end of input or until `token` is
/// cancelled. Bad lines are logged and skipped; only read errors abort.
pub async fn run_relay<R, T>(
    reader: R,
    service: &TelemetryService<T>,
    token: &CancellationToken,
) -> anyhow::Result<RelaySummary>
where
    R: AsyncBufRead + Unpin,
    T: Transport,
{
    let mut lines = reader.lines();
    let mut summary = RelaySummary::default();

    loop {
        let line = tokio::select! {
            () = token.cancelled() => {
                summary.interrupted = true;
                break;
            }
            line = lines.next_line() => line.context("Failed to read event input")?,
        };

        let Some(line) = line else {
            debug!("End of event input");
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines_read += 1;

        match relay_line(line, service) {
            Ok(()) => summary.events_tracked += 1,
            Err(e) => {
                summary.lines_rejected += 1;
                warn!("Skipping input line {}: {}", summary.lines_read, e);
            }
        }
    }

    info!(
        "Relay finished: {} lines read, {} events tracked, {} rejected",
        summary.lines_read, summary.events_tracked, summary.lines_rejected
    );
    Ok(summary)
}

fn relay_line<T: Transport>(line: &str, service: &TelemetryService<T>) -> Result<(), RelayLineError> {
    let parsed = RelayLine::parse(line)?;

    if let Some(path) = parsed.page_url {
        service.navigate(path);
    }
    service.track(parsed.event_type, &parsed.payload)?;
    Ok(())
}
