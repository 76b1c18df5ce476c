//! Frame pipeline: shared context, published snapshots and the worker thread

pub mod context;
pub mod snapshot;
pub mod worker;

#[cfg(test)]
mod tests;

pub use context::PipelineContext;
pub use snapshot::{BpmReading, LatestResult, PipelineSnapshot, QueueStatus, ResultStatus};
pub use worker::{ComponentState, PipelineWorker};
