//! Deferred background tasks and one-shot outcome settlement.
//!
//! This module provides:
//! - `TaskOutcome` / `TaskState` / `TaskReport`, the settlement data model
//! - `DeferredTask`, delayed or immediate background work with cooperative
//!   cancellation and idempotent observation
//! - `OutcomeAggregator`, a single settleable outcome fed by background
//!   work, with fan-out failure accumulation

mod aggregator;
mod deferred;
mod outcome;

pub use aggregator::OutcomeAggregator;
pub use deferred::DeferredTask;
pub use outcome::{OutcomeKind, TaskOutcome, TaskReport, TaskState};
