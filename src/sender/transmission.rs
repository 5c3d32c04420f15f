use super::serialization::{BatchSerializer, SerializationError};
use super::{ClientError, HttpClient, Transport};
use crate::buffer::Batch;
use reqwest::header::{
    CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum TransmissionError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] SerializationError),
    #[error("Client error: {0}")]
    ClientError(#[from] ClientError),
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Collector rejected batch: HTTP {status}")]
    Rejected { status: u16 },
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(String),
}

#[derive(Debug, Clone)]
pub struct TransmissionResult {
    pub status_code: u16,
    pub latency: Duration,
    pub batch_id: String,
    pub bytes_sent: usize,
    pub compressed: bool,
}

/// Posts batches to the collector as `{"events": [...]}`.
#[derive(Debug, Clone)]
pub struct BatchTransmitter {
    pub client: HttpClient,
    serializer: BatchSerializer,
}

impl BatchTransmitter {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            serializer: BatchSerializer::new(),
        }
    }

    pub async fn send_batch(&self, batch: &Batch) -> Result<TransmissionResult, TransmissionError> {
        let start = Instant::now();

        debug!(
            "Sending batch {} with {} events (trigger: {})",
            batch.id(),
            batch.size(),
            batch.trigger()
        );

        let (payload, compressed) = self.prepare_payload(batch)?;
        let bytes_sent = payload.len();
        let headers = self.build_headers(batch, compressed)?;

        let result = self
            .client
            .client
            .post(self.client.collector_url.clone())
            .headers(headers)
            .body(payload)
            .send()
            .await;
        let latency = start.elapsed();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.client.stats.record_request(false, latency);
                return Err(TransmissionError::RequestError(e));
            }
        };

        let status = response.status();
        self.client.stats.record_request(status.is_success(), latency);

        if !status.is_success() {
            warn!(
                "Collector rejected batch {} ({} events): HTTP {}",
                batch.id(),
                batch.size(),
                status.as_u16()
            );
            return Err(TransmissionError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(
            "Sent batch {} ({} events, {} bytes) in {:?}",
            batch.id(),
            batch.size(),
            bytes_sent,
            latency
        );

        Ok(TransmissionResult {
            status_code: status.as_u16(),
            latency,
            batch_id: batch.id().to_string(),
            bytes_sent,
            compressed,
        })
    }

    /// Serialized body plus whether it ended up gzip-compressed.
    pub fn prepare_payload(&self, batch: &Batch) -> Result<(Vec<u8>, bool), SerializationError> {
        let body = self.serializer.serialize(batch)?;
        let config = &self.client.config;

        if config.enable_compression && body.len() >= config.compression_min_bytes {
            Ok((self.serializer.compress(&body)?, true))
        } else {
            Ok((body, false))
        }
    }

    pub fn build_headers(
        &self,
        batch: &Batch,
        compressed: bool,
    ) -> Result<HeaderMap, TransmissionError> {
        let mut headers = HeaderMap::new();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if compressed {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }

        headers.insert(
            HeaderName::from_static("x-batch-id"),
            HeaderValue::from_str(batch.id()).map_err(|e| {
                TransmissionError::InvalidHeaderValue(format!("Invalid batch ID: {e}"))
            })?,
        );

        headers.insert(
            HeaderName::from_static("x-batch-size"),
            HeaderValue::from(batch.size() as u64),
        );

        headers.insert(
            HeaderName::from_static("x-batch-trigger"),
            HeaderValue::from_static(batch.trigger().as_str()),
        );

        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.client.config.user_agent).map_err(|e| {
                TransmissionError::InvalidHeaderValue(format!("Invalid user agent: {e}"))
            })?,
        );

        Ok(headers)
    }
}

impl Transport for BatchTransmitter {
    async fn send(&self, batch: &Batch) -> Result<TransmissionResult, TransmissionError> {
        self.send_batch(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FlushTrigger;
    use crate::domain::{Event, EventType};
    use crate::sender::ClientConfig;
    use serde_json::Map;

    fn transmitter(enable_compression: bool, compression_min_bytes: usize) -> BatchTransmitter {
        let client = HttpClient::new(ClientConfig {
            enable_compression,
            compression_min_bytes,
            ..Default::default()
        })
        .unwrap();
        BatchTransmitter::new(client)
    }

    fn batch(n: usize) -> Batch {
        let events = (0..n)
            .map(|i| Event::with_timestamp(EventType::PageView, i as i64, "s", "/", Map::new()))
            .collect();
        Batch::new(events, FlushTrigger::Size)
    }

    #[test]
    fn test_headers_describe_batch() {
        let transmitter = transmitter(false, 0);
        let batch = batch(3);
        let headers = transmitter.build_headers(&batch, false).unwrap();

        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers["x-batch-size"], "3");
        assert_eq!(headers["x-batch-trigger"], "size");
        assert_eq!(headers["x-batch-id"], batch.id());
        assert!(headers.get(CONTENT_ENCODING).is_none());
    }

    #[test]
    fn test_small_bodies_skip_compression() {
        let (_, compressed) = transmitter(true, 1_000_000).prepare_payload(&batch(2)).unwrap();
        assert!(!compressed);

        let (_, compressed) = transmitter(true, 0).prepare_payload(&batch(2)).unwrap();
        assert!(compressed);

        let (_, compressed) = transmitter(false, 0).prepare_payload(&batch(2)).unwrap();
        assert!(!compressed);
    }
}
