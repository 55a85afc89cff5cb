pub mod completeness;
pub mod cycle;
pub mod driver;
pub mod errors;
pub mod schedule;

pub use completeness::CompletenessCheck;
pub use cycle::{normalize_batch, CycleResult, IngestionCycle, NormalizedBatch};
pub use driver::{IngestionLoop, LoopSummary, TickAction, TickReport};
pub use errors::CollectorError;
pub use schedule::{ErrorLogThrottle, SleepPolicy};
