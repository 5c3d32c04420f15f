pub mod batch;
pub mod queue;
pub mod scheduler;

pub use batch::{Batch, BatchConfig, FlushTrigger};
pub use queue::{EventQueue, PushOutcome};
pub use scheduler::{BatchScheduler, DrainReport, SchedulerState};
