//! Bounded concurrent task execution and error aggregation.

pub mod errors_queue;
pub mod runner;

pub use errors_queue::ErrorsQueue;
pub use runner::{BoundedRunner, QueueMode, RunSummary, RunnerOpts, Task};
