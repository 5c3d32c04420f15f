#![deny(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Durations and sizes stay within u64
    clippy::cast_precision_loss,      // Acceptable for latency statistics
    clippy::cast_sign_loss,           // Values are known non-negative
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,  // e.g. TelemetryError in telemetry
    clippy::must_use_candidate,
    clippy::doc_markdown
)]

pub mod app;
pub mod buffer;
pub mod domain;
pub mod reliability;
pub mod sender;
pub mod telemetry;

pub use app::{App, Config};
pub use domain::{EnvironmentFacts, Event, EventType, TelemetryError};
pub use telemetry::{ShutdownReport, TelemetryConfig, TelemetryService};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
