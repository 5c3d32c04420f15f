//! Domain layer for shopfront-telemetry.
//!
//! Contains the canonical types shared across all modules:
//! - `Event`: one analytics record, stamped and ready for batching
//! - `SessionContext`: per-lifetime identifiers attached to every event
//! - `EnvironmentFacts`: host facts injected at construction
//! - `TelemetryError`: Top-level error type

pub mod environment;
pub mod error;
pub mod event;
pub mod session;

pub use environment::{EnvironmentFacts, NavigationTiming, ScreenSize};
pub use error::TelemetryError;
pub use event::{Event, EventType, STAMPED_FIELDS, payload_to_fields};
pub use session::SessionContext;
