//! Deferred background execution with cooperative cancellation.

use super::outcome::{TaskOutcome, TaskReport, TaskState};
use crate::cancellation::CancellationToken;
use crate::errors::{OperationError, TaskError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

struct TaskShared<T> {
    id: Uuid,
    state: RwLock<TaskState>,
    outcome: RwLock<Option<TaskOutcome<T>>>,
    settled: Notify,
    scheduled_at: DateTime<Utc>,
    settled_at: RwLock<Option<DateTime<Utc>>>,
}

/// A unit of work that begins after a delay or immediately on a background
/// execution context.
///
/// Lifecycle: `created → scheduled → running → settled`. Settlement is
/// terminal and happens exactly once; after that the task is immutable and
/// cheap clones of the handle observe the same outcome.
///
/// A failure raised by the operation never escapes: it is captured into
/// the settled outcome. Cancellation is cooperative - the token is checked
/// before and after the delay, and a looping operation is expected to poll
/// the token at each iteration boundary itself.
pub struct DeferredTask<T> {
    shared: Arc<TaskShared<T>>,
}

impl<T> Clone for DeferredTask<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> DeferredTask<T> {
    /// Schedules a synchronous operation on the blocking pool.
    ///
    /// Suspends for `delay` cooperatively, checking `token` before and
    /// after; if cancelled before the operation starts, settles as
    /// `Cancelled` without invoking it. A panic inside the operation is
    /// captured as a failure. An operation that observes cancellation
    /// itself returns [`TaskError::Cancelled`] (typically via
    /// [`CancellationToken::error_if_cancelled`]) and settles the task as
    /// cancelled.
    pub fn schedule<F>(op: F, delay: Duration, token: Option<CancellationToken>) -> Self
    where
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let task = Self::pending();
        task.mark(TaskState::Scheduled);

        let handle = task.clone();
        tokio::spawn(async move {
            if !handle.pass_delay(delay, token.as_ref()).await {
                return;
            }

            handle.mark(TaskState::Running);
            let outcome = match tokio::task::spawn_blocking(op).await {
                Ok(result) => TaskOutcome::from(result),
                Err(join_error) => TaskOutcome::failure(OperationError::new(format!(
                    "background operation panicked: {join_error}"
                ))),
            };
            handle.settle(outcome);
        });

        task
    }

    /// Schedules an asynchronous operation.
    ///
    /// Same lifecycle as [`schedule`](Self::schedule), for operations that
    /// themselves suspend. A looping operation captures a clone of the
    /// token and polls it at each iteration boundary; cancellation is
    /// cooperative, never preemptive.
    pub fn spawn<F, Fut>(op: F, delay: Duration, token: Option<CancellationToken>) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let task = Self::pending();
        task.mark(TaskState::Scheduled);

        let handle = task.clone();
        tokio::spawn(async move {
            if !handle.pass_delay(delay, token.as_ref()).await {
                return;
            }

            handle.mark(TaskState::Running);
            let outcome = match tokio::spawn(op()).await {
                Ok(result) => TaskOutcome::from(result),
                Err(join_error) => TaskOutcome::failure(OperationError::new(format!(
                    "background operation panicked: {join_error}"
                ))),
            };
            handle.settle(outcome);
        });

        task
    }

    /// Creates a task that is already settled with the given outcome.
    #[must_use]
    pub fn settled(outcome: TaskOutcome<T>) -> Self {
        let task = Self::pending();
        task.settle(outcome);
        task
    }

    /// Creates an unsettled task handle.
    ///
    /// Used by the chain builder and the aggregator to settle later.
    pub(crate) fn pending() -> Self {
        Self {
            shared: Arc::new(TaskShared {
                id: Uuid::new_v4(),
                state: RwLock::new(TaskState::Created),
                outcome: RwLock::new(None),
                settled: Notify::new(),
                scheduled_at: Utc::now(),
                settled_at: RwLock::new(None),
            }),
        }
    }

    /// Performs the terminal transition; later calls are warn-logged
    /// no-ops.
    pub(crate) fn settle(&self, outcome: TaskOutcome<T>) {
        {
            let mut slot = self.shared.outcome.write();
            if slot.is_some() {
                warn!(task_id = %self.shared.id, "task already settled; outcome dropped");
                return;
            }
            *slot = Some(outcome);
            *self.shared.state.write() = TaskState::Settled;
            *self.shared.settled_at.write() = Some(Utc::now());
        }
        debug!(task_id = %self.shared.id, "task settled");
        self.shared.settled.notify_waiters();
    }

    /// Cooperative delay with token checks on both sides.
    ///
    /// Returns false after settling `Cancelled`.
    async fn pass_delay(&self, delay: Duration, token: Option<&CancellationToken>) -> bool {
        if token.is_some_and(CancellationToken::is_cancelled) {
            self.settle(TaskOutcome::Cancelled);
            return false;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if token.is_some_and(CancellationToken::is_cancelled) {
            self.settle(TaskOutcome::Cancelled);
            return false;
        }
        true
    }

    /// Suspends the caller until settlement and yields the outcome.
    ///
    /// Idempotent observation: any number of calls return the identical
    /// settled outcome.
    pub async fn await_result(&self) -> TaskOutcome<T>
    where
        T: Clone,
    {
        loop {
            // Register for the notification before checking, so a
            // settlement between the check and the await is not missed.
            let settled = self.shared.settled.notified();
            if let Some(outcome) = self.shared.outcome.read().clone() {
                return outcome;
            }
            settled.await;
        }
    }

    /// Returns the task id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.shared.state.read()
    }

    /// Returns whether the task has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared.outcome.read().is_some()
    }

    /// Returns a serializable lifecycle summary.
    #[must_use]
    pub fn report(&self) -> TaskReport {
        let outcome = self.shared.outcome.read();
        TaskReport {
            task_id: self.shared.id,
            state: self.state(),
            scheduled_at: self.shared.scheduled_at,
            settled_at: *self.shared.settled_at.read(),
            outcome: outcome.as_ref().map(TaskOutcome::kind),
            errors: outcome
                .as_ref()
                .and_then(TaskOutcome::failure_causes)
                .map(|agg| agg.causes.iter().map(ToString::to_string).collect())
                .unwrap_or_default(),
        }
    }

    fn mark(&self, state: TaskState) {
        let mut current = self.shared.state.write();
        if *current != TaskState::Settled {
            *current = state;
        }
    }
}

impl<T: Clone + Send + Sync + 'static> std::future::IntoFuture for DeferredTask<T> {
    type Output = TaskOutcome<T>;
    type IntoFuture = futures::future::BoxFuture<'static, TaskOutcome<T>>;

    /// Awaiting the task handle directly is shorthand for
    /// [`await_result`](Self::await_result).
    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.await_result().await })
    }
}

impl<T> std::fmt::Debug for DeferredTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTask")
            .field("id", &self.shared.id)
            .field("state", &*self.shared.state.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::cancellation_pair;
    use crate::errors::TaskError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_schedule_immediate_success() {
        let task = DeferredTask::schedule(|| Ok(2 + 2), Duration::ZERO, None);
        let outcome = task.await_result().await;
        assert_eq!(outcome, TaskOutcome::Success(4));
        assert_eq!(task.state(), TaskState::Settled);
    }

    #[tokio::test]
    async fn test_schedule_captures_failure() {
        let task: DeferredTask<i32> = DeferredTask::schedule(
            || Err(OperationError::new("disk on fire").into()),
            Duration::ZERO,
            None,
        );

        match task.await_result().await.into_result() {
            Err(TaskError::Failed(cause)) => assert_eq!(cause.message, "disk on fire"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_schedule_captures_panic() {
        let task: DeferredTask<i32> =
            DeferredTask::schedule(|| panic!("unexpected"), Duration::ZERO, None);

        let outcome = task.await_result().await;
        assert!(outcome.is_failure());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_op() {
        let (source, token) = cancellation_pair();
        source.cancel("too late");

        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = invoked.clone();
        let task = DeferredTask::schedule(
            move || {
                invoked_clone.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            },
            Duration::ZERO,
            Some(token),
        );

        let outcome = task.await_result().await;
        assert!(outcome.is_cancelled());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_delay() {
        let (source, token) = cancellation_pair();

        let task = DeferredTask::schedule(|| Ok(1), Duration::from_millis(200), Some(token));

        tokio::time::sleep(Duration::from_millis(20)).await;
        source.cancel("changed my mind");

        let outcome = task.await_result().await;
        assert!(outcome.is_cancelled());
    }

    #[tokio::test]
    async fn test_await_result_idempotent() {
        let task = DeferredTask::schedule(|| Ok("once".to_string()), Duration::ZERO, None);

        let first = task.await_result().await;
        let second = task.await_result().await;
        let third = task.await_result().await;

        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[tokio::test]
    async fn test_spawn_async_operation() {
        let task = DeferredTask::spawn(
            || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(21 * 2)
            },
            Duration::ZERO,
            None,
        );

        assert_eq!(task.await_result().await, TaskOutcome::Success(42));
    }

    #[tokio::test]
    async fn test_task_handle_awaits_directly() {
        let task = DeferredTask::schedule(|| Ok(11), Duration::ZERO, None);
        assert_eq!(task.await, TaskOutcome::Success(11));
    }

    #[tokio::test]
    async fn test_settled_constructor() {
        let task = DeferredTask::settled(TaskOutcome::Success(9));
        assert!(task.is_settled());
        assert_eq!(task.await_result().await, TaskOutcome::Success(9));
    }

    #[tokio::test]
    async fn test_double_settle_is_noop() {
        let task: DeferredTask<i32> = DeferredTask::pending();
        task.settle(TaskOutcome::Success(1));
        task.settle(TaskOutcome::Success(2));

        assert_eq!(task.await_result().await, TaskOutcome::Success(1));
    }

    #[tokio::test]
    async fn test_report_reflects_settlement() {
        let task: DeferredTask<i32> = DeferredTask::schedule(
            || Err(OperationError::new("boom").into()),
            Duration::ZERO,
            None,
        );
        let _ = task.await_result().await;

        let report = task.report();
        assert_eq!(report.state, TaskState::Settled);
        assert_eq!(report.outcome, Some(crate::task::OutcomeKind::Failure));
        assert_eq!(report.errors, vec!["boom".to_string()]);
        assert!(report.duration_ms().is_some());
    }
}
