pub mod client;
pub mod metrics;
pub mod serialization;
pub mod transmission;

pub use client::{ClientConfig, ClientError, ConnectionStats, HttpClient};
pub use metrics::{StatsSnapshot, TelemetryStats};
pub use serialization::{BatchSerializer, SerializationError};
pub use transmission::{BatchTransmitter, TransmissionError, TransmissionResult};

use crate::buffer::Batch;
use std::future::Future;

/// Delivers one batch to the collector.
///
/// The scheduler treats any `Err` the same way: the batch goes back to the
/// front of the queue. Implementations should not retry internally.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        batch: &Batch,
    ) -> impl Future<Output = Result<TransmissionResult, TransmissionError>> + Send;
}
