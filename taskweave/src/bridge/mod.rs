//! Bridge from event-based legacy workers into deferred tasks.
//!
//! A legacy worker reports through progress/completed callbacks instead of
//! returning a value. The bridge hands the worker a `WorkerHandler` with
//! exclusive one-shot write access to an outcome aggregator: the worker
//! settles on completion, never before, and a worker that disappears
//! without reporting still produces a failure outcome rather than leaving
//! the task pending forever.

use crate::errors::OperationError;
use crate::task::{DeferredTask, OutcomeAggregator};
use std::sync::Arc;
use tracing::{debug, warn};

/// Progress observer callback, invoked with a percentage in `0..=100`.
pub type ProgressObserver = Arc<dyn Fn(u8) + Send + Sync>;

/// The completion surface handed to an event-driven worker.
///
/// The handler is the sole writer of the bridged outcome. `completed` must
/// be invoked exactly once; a second invocation is a warn-logged no-op,
/// and dropping the handler without invoking it settles a failure.
pub struct WorkerHandler<T> {
    aggregator: OutcomeAggregator<T>,
    on_progress: Option<ProgressObserver>,
}

impl<T> WorkerHandler<T> {
    /// Reports intermediate progress.
    pub fn progress(&self, percent: u8) {
        debug!(percent, "worker progress");
        if let Some(ref observer) = self.on_progress {
            observer(percent);
        }
    }

    /// Reports the final result, settling the bridged task.
    pub fn completed(&self, result: Result<T, OperationError>) {
        match result {
            Ok(value) => {
                self.aggregator.settle(value);
            }
            Err(error) => {
                self.aggregator.settle_error(error);
            }
        }
    }
}

impl<T> Drop for WorkerHandler<T> {
    fn drop(&mut self) {
        if !self.aggregator.is_settled() {
            warn!("worker released its completion handler without reporting a result");
            self.aggregator.settle_error(OperationError::new(
                "worker finished without reporting completion",
            ));
        }
    }
}

/// An event-based legacy worker.
///
/// `run` executes on a background context and must drive the work to the
/// point of invoking [`WorkerHandler::completed`] exactly once before the
/// handler goes out of scope.
pub trait EventDrivenWorker<T>: Send + 'static {
    /// Runs the worker, reporting through `handler`.
    fn run(self, handler: WorkerHandler<T>);
}

impl<T, F> EventDrivenWorker<T> for F
where
    F: FnOnce(WorkerHandler<T>) + Send + 'static,
{
    fn run(self, handler: WorkerHandler<T>) {
        self(handler);
    }
}

/// Bridges a legacy worker into a deferred task.
pub fn bridge_worker<T, W>(worker: W) -> DeferredTask<T>
where
    T: Clone + Send + Sync + 'static,
    W: EventDrivenWorker<T>,
{
    bridge_worker_with_progress(worker, None)
}

/// Bridges a legacy worker, forwarding progress reports to `on_progress`.
pub fn bridge_worker_with_progress<T, W>(
    worker: W,
    on_progress: Option<ProgressObserver>,
) -> DeferredTask<T>
where
    T: Clone + Send + Sync + 'static,
    W: EventDrivenWorker<T>,
{
    let aggregator = OutcomeAggregator::new();
    let handler = WorkerHandler {
        aggregator: aggregator.clone(),
        on_progress,
    };

    // Legacy workers are allowed to block, so they run on the blocking
    // pool; a panic drops the handler mid-run, which settles a failure.
    tokio::task::spawn_blocking(move || worker.run(handler));

    aggregator.into_task()
}
