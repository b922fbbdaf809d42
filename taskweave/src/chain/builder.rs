//! Builder for sequences of dependent tasks.

use crate::errors::OperationError;
use crate::task::{DeferredTask, TaskOutcome};
use std::panic::AssertUnwindSafe;
use tracing::warn;

/// Composes a sequence of dependent tasks where each stage consumes the
/// prior stage's result.
///
/// Stage *i+1* is scheduled strictly after stage *i* settles, and only if
/// it settled successfully; stages never run concurrently and are never
/// started eagerly. On failure or cancellation the chain settles with that
/// same outcome and no further stages run - fail-fast short-circuit, not
/// fail-soft aggregation.
pub struct ContinuationChain<T> {
    task: DeferredTask<T>,
}

impl<T: Clone + Send + Sync + 'static> ContinuationChain<T> {
    /// Starts a chain from an initial task.
    #[must_use]
    pub fn new(initial: DeferredTask<T>) -> Self {
        Self { task: initial }
    }

    /// Registers the next stage, consuming the prior stage's value.
    ///
    /// The stage function is invoked only after the prior stage settles
    /// successfully; a failing or cancelled prior stage propagates its
    /// exact outcome past this stage. A panic inside the stage function is
    /// captured as the chain's failure.
    #[must_use]
    pub fn then<U, F>(self, stage: F) -> ContinuationChain<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> DeferredTask<U> + Send + 'static,
    {
        let next = DeferredTask::pending();
        let handle = next.clone();
        let prev = self.task;

        tokio::spawn(async move {
            match prev.await_result().await {
                TaskOutcome::Success(value) => {
                    let stage_task =
                        std::panic::catch_unwind(AssertUnwindSafe(move || stage(value)));
                    match stage_task {
                        Ok(task) => {
                            let outcome = task.await_result().await;
                            handle.settle(outcome);
                        }
                        Err(panic) => {
                            warn!("Continuation stage panicked: {:?}", panic);
                            handle.settle(TaskOutcome::failure(OperationError::new(
                                "continuation stage panicked",
                            )));
                        }
                    }
                }
                TaskOutcome::Failure(causes) => {
                    handle.settle(TaskOutcome::Failure(causes));
                }
                TaskOutcome::Cancelled => {
                    handle.settle(TaskOutcome::Cancelled);
                }
            }
        });

        ContinuationChain { task: next }
    }

    /// Registers a terminal observer that runs regardless of outcome.
    ///
    /// The observer sees the settled outcome but cannot alter it; the
    /// chain continues to settle with the observed outcome even if the
    /// observer panics.
    #[must_use]
    pub fn finally<F>(self, observer: F) -> ContinuationChain<T>
    where
        F: FnOnce(&TaskOutcome<T>) + Send + 'static,
    {
        let next = DeferredTask::pending();
        let handle = next.clone();
        let prev = self.task;

        tokio::spawn(async move {
            let outcome = prev.await_result().await;
            if let Err(panic) =
                std::panic::catch_unwind(AssertUnwindSafe(|| observer(&outcome)))
            {
                warn!("Finally observer panicked: {:?}", panic);
            }
            handle.settle(outcome);
        });

        ContinuationChain { task: next }
    }

    /// Terminates the builder, yielding the chain's own task.
    #[must_use]
    pub fn into_task(self) -> DeferredTask<T> {
        self.task
    }
}

impl<T> std::fmt::Debug for ContinuationChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationChain")
            .field("task", &self.task)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::chain;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn immediate<T: Clone + Send + Sync + 'static>(value: T) -> DeferredTask<T> {
        DeferredTask::schedule(move || Ok(value), Duration::ZERO, None)
    }

    #[tokio::test]
    async fn test_two_stage_chain() {
        let task = chain(immediate(5))
            .then(|n| immediate(n * 2))
            .then(|n| immediate(format!("result={n}")))
            .into_task();

        assert_eq!(
            task.await_result().await,
            TaskOutcome::Success("result=10".to_string())
        );
    }

    #[tokio::test]
    async fn test_stage_not_started_eagerly() {
        let started = Arc::new(AtomicUsize::new(0));
        let gate: DeferredTask<i32> = DeferredTask::pending();

        let started_clone = started.clone();
        let task = chain(gate.clone())
            .then(move |n| {
                started_clone.fetch_add(1, Ordering::SeqCst);
                immediate(n + 1)
            })
            .into_task();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);

        gate.settle(TaskOutcome::Success(1));
        assert_eq!(task.await_result().await, TaskOutcome::Success(2));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_short_circuits_remaining_stages() {
        let ran = Arc::new(AtomicUsize::new(0));

        let failing: DeferredTask<i32> = DeferredTask::schedule(
            || Err(crate::errors::OperationError::new("stage one broke").into()),
            Duration::ZERO,
            None,
        );

        let ran_a = ran.clone();
        let ran_b = ran.clone();
        let task = chain(failing)
            .then(move |n| {
                ran_a.fetch_add(1, Ordering::SeqCst);
                immediate(n + 1)
            })
            .then(move |n| {
                ran_b.fetch_add(1, Ordering::SeqCst);
                immediate(n + 1)
            })
            .into_task();

        let outcome = task.await_result().await;
        let causes = outcome.failure_causes().expect("failure expected");
        assert_eq!(causes.causes[0].message, "stage one broke");
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let cancelled: DeferredTask<i32> = DeferredTask::settled(TaskOutcome::Cancelled);

        let task = chain(cancelled).then(|n| immediate(n + 1)).into_task();

        assert!(task.await_result().await.is_cancelled());
    }

    #[tokio::test]
    async fn test_finally_runs_on_success_and_failure() {
        let notified = Arc::new(AtomicUsize::new(0));

        let notified_ok = notified.clone();
        let ok = chain(immediate(1))
            .finally(move |outcome| {
                assert!(outcome.is_success());
                notified_ok.fetch_add(1, Ordering::SeqCst);
            })
            .into_task();
        assert_eq!(ok.await_result().await, TaskOutcome::Success(1));

        let notified_err = notified.clone();
        let failing: DeferredTask<i32> = DeferredTask::schedule(
            || Err(crate::errors::OperationError::new("boom").into()),
            Duration::ZERO,
            None,
        );
        let err = chain(failing)
            .finally(move |outcome| {
                assert!(outcome.is_failure());
                notified_err.fetch_add(1, Ordering::SeqCst);
            })
            .into_task();
        assert!(err.await_result().await.is_failure());

        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_finally_cannot_alter_outcome() {
        let task = chain(immediate(3))
            .finally(|_| panic!("observer blew up"))
            .into_task();

        assert_eq!(task.await_result().await, TaskOutcome::Success(3));
    }

    #[tokio::test]
    async fn test_stage_panic_captured() {
        let task: DeferredTask<i32> = chain(immediate(1))
            .then(|_| -> DeferredTask<i32> { panic!("stage construction failed") })
            .into_task();

        let outcome = task.await_result().await;
        assert!(outcome.is_failure());
    }
}
