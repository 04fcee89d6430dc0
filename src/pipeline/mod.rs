//! Record dispatch: reader → driver thread → bounded pool → aggregated outcome.

pub mod context;
pub mod counters;
pub mod orchestrator;

pub use context::{DispatchOpts, DispatchOutcome};
pub use counters::SuccessCounters;
pub use orchestrator::dispatch_records;
