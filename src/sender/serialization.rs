use crate::buffer::Batch;
use crate::domain::Event;
use flate2::{Compression, write::GzEncoder};
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

// Rough per-event size used to pre-size the output buffer
const ESTIMATED_EVENT_SIZE: usize = 256;
const ENVELOPE_OVERHEAD: usize = 16;
const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error during serialization: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Batch is empty")]
    EmptyBatch,
}

/// Collector request body: `{"events": [...]}`.
#[derive(Serialize)]
struct Envelope<'a> {
    events: &'a [Event],
}

#[derive(Debug, Clone, Default)]
pub struct BatchSerializer;

impl BatchSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize(&self, batch: &Batch) -> Result<Vec<u8>, SerializationError> {
        if batch.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let mut buffer = Vec::with_capacity(self.estimate_serialized_size(batch));
        serde_json::to_writer(
            &mut buffer,
            &Envelope {
                events: batch.events(),
            },
        )?;
        Ok(buffer)
    }

    pub fn compress(&self, payload: &[u8]) -> Result<Vec<u8>, SerializationError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(payload)?;
        Ok(encoder.finish()?)
    }

    pub fn estimate_serialized_size(&self, batch: &Batch) -> usize {
        batch
            .size()
            .saturating_mul(ESTIMATED_EVENT_SIZE)
            .saturating_add(ENVELOPE_OVERHEAD)
            .min(MAX_PREALLOCATION)
    }
}
