pub mod retry;

pub use retry::{BackoffPolicy, RetryConfig};
