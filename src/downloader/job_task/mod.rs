//! Job task execution -- the per-entry state machine.
//!
//! Split into focused submodules:
//! - [`context`] - Shared state and the cancellation point
//! - [`orchestration`] - Dedup, metadata, size check, fetch, completion, post-processing
//! - [`progress`] - Mapping fetch progress onto the registry
//! - [`finalization`] - Terminal queue, registry and event updates

mod context;
mod finalization;
mod orchestration;
mod progress;


pub(crate) use context::{ActiveJobGuard, JobTaskContext};
pub(crate) use orchestration::run_job_task;
