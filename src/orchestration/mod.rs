//! Build orchestration
//!
//! Coordinates bundle builds so that any number of concurrent requests for
//! one cache key share a single build:
//! - cached keys are served straight from the store
//! - uncached keys join the running build or start exactly one

mod coordinator;
mod inflight;

pub use coordinator::BuildCoordinator;
pub use inflight::{BuildOutcome, InFlightRegistry, SharedBuild};
