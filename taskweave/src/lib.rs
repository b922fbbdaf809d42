//! # Taskweave
//!
//! An asynchronous task coordination toolkit.
//!
//! Taskweave treats the operations themselves as opaque - "fetch remote
//! content" and "run a CPU-bound computation" are injected by the caller -
//! and owns only *how* such operations are scheduled, composed, protected,
//! cancelled, and reported:
//!
//! - **Deferred execution**: Delayed or immediate background work with
//!   captured failures and idempotent observation
//! - **Continuation chains**: Sequential dependent stages with fail-fast
//!   short-circuiting
//! - **Cooperative cancellation**: Source/token pairs that in-flight work
//!   polls voluntarily
//! - **Mutual exclusion**: An async mutex and a counting semaphore with
//!   FIFO waiters and scoped-release guards
//! - **Outcome aggregation**: One-shot settlement with ordered multi-cause
//!   failure sets and selective acknowledgement
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use taskweave::prelude::*;
//! use std::time::Duration;
//!
//! let (source, token) = cancellation_pair();
//!
//! let task = DeferredTask::schedule(
//!     || Ok(expensive_computation()),
//!     Duration::from_secs(1),
//!     Some(token),
//! );
//!
//! let outcome = chain(task)
//!     .then(|value| DeferredTask::schedule(move || Ok(value * 2), Duration::ZERO, None))
//!     .finally(|outcome| println!("task finished: {:?}", outcome.kind()))
//!     .into_task()
//!     .await_result()
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bridge;
pub mod cancellation;
pub mod chain;
pub mod errors;
pub mod host;
pub mod sync;
pub mod task;
pub mod testing;


/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{
        bridge_worker, bridge_worker_with_progress, EventDrivenWorker, WorkerHandler,
    };
    pub use crate::cancellation::{
        cancellation_pair, CancellationSource, CancellationToken,
    };
    pub use crate::chain::{chain, ContinuationChain};
    pub use crate::errors::{AggregateError, OperationError, TaskError};
    pub use crate::host::{fetch_deferred, run_cpu_bound, RemoteTextSource};
    pub use crate::sync::{AsyncMutex, CountingSemaphore, MutexGuard, SemaphorePermit};
    pub use crate::task::{
        DeferredTask, OutcomeAggregator, OutcomeKind, TaskOutcome, TaskReport, TaskState,
    };
}
