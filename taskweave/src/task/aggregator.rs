//! One-shot outcome settlement fed by background work.

use super::deferred::DeferredTask;
use super::outcome::TaskOutcome;
use crate::errors::{AggregateError, OperationError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

struct AggregatorShared<T> {
    outcome: RwLock<Option<TaskOutcome<T>>>,
    /// Causes recorded by fan-out branches before settlement, in arrival
    /// order.
    recorded: Mutex<Vec<OperationError>>,
    /// Acknowledgement flags, one per settled cause.
    acknowledged: Mutex<Vec<bool>>,
    settled: Notify,
}

/// Captures success or failure from background work and exposes a single
/// settleable outcome.
///
/// The settle methods perform the one terminal transition; calling any of
/// them after settlement is a warn-logged no-op that cannot alter the
/// settled value. Multiple concurrently failing sub-operations are
/// accumulated via [`record_failure`](Self::record_failure) and settled
/// together, so a fan-out surfaces every cause rather than only the first.
///
/// Handles are cheap clones sharing the same outcome; a producer callback
/// is typically given one clone with exclusive write intent while any
/// number of observers await [`observe`](Self::observe).
pub struct OutcomeAggregator<T> {
    shared: Arc<AggregatorShared<T>>,
}

impl<T> Clone for OutcomeAggregator<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Default for OutcomeAggregator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OutcomeAggregator<T> {
    /// Creates an unsettled aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(AggregatorShared {
                outcome: RwLock::new(None),
                recorded: Mutex::new(Vec::new()),
                acknowledged: Mutex::new(Vec::new()),
                settled: Notify::new(),
            }),
        }
    }

    /// Settles with a success value.
    ///
    /// Returns true if this call performed the settlement; a repeat call
    /// is a warn-logged no-op returning false.
    pub fn settle(&self, value: T) -> bool {
        self.settle_outcome(TaskOutcome::Success(value))
    }

    /// Records a failure cause and settles with the accumulated set.
    ///
    /// Shorthand for [`record_failure`](Self::record_failure) followed by
    /// [`settle_recorded`](Self::settle_recorded).
    pub fn settle_error(&self, error: OperationError) -> bool {
        self.record_failure(error);
        self.settle_recorded()
    }

    /// Settles as cancelled.
    pub fn settle_cancelled(&self) -> bool {
        self.settle_outcome(TaskOutcome::Cancelled)
    }

    /// Records one failure cause from a fan-out branch without settling.
    ///
    /// Causes keep their arrival order. Recording after settlement is a
    /// warn-logged no-op.
    pub fn record_failure(&self, error: OperationError) {
        if self.is_settled() {
            warn!("aggregator already settled; failure cause dropped");
            return;
        }
        self.shared.recorded.lock().push(error);
    }

    /// Settles with every recorded cause as one ordered failure set.
    ///
    /// Returns true if this call performed the settlement. Settling with
    /// no recorded causes is refused (a failure set is never empty).
    pub fn settle_recorded(&self) -> bool {
        let causes: Vec<OperationError> = std::mem::take(&mut *self.shared.recorded.lock());
        if causes.is_empty() {
            warn!("no failure causes recorded; nothing to settle");
            return false;
        }
        self.settle_outcome(TaskOutcome::Failure(AggregateError::new(causes)))
    }

    /// Returns whether the outcome has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared.outcome.read().is_some()
    }

    /// Acknowledges settled failure causes matched by `predicate`.
    ///
    /// Returns whether every cause has been acknowledged (across all
    /// `handle` calls so far). With no settled failure there is nothing to
    /// acknowledge and this returns true. Unacknowledged causes remain
    /// visible through [`unacknowledged`](Self::unacknowledged) and must
    /// still be surfaced by the caller.
    pub fn handle<F>(&self, predicate: F) -> bool
    where
        F: Fn(&OperationError) -> bool,
    {
        let outcome = self.shared.outcome.read();
        let causes = match outcome.as_ref() {
            Some(TaskOutcome::Failure(agg)) => &agg.causes,
            _ => return true,
        };

        let mut acknowledged = self.shared.acknowledged.lock();
        if acknowledged.len() != causes.len() {
            acknowledged.resize(causes.len(), false);
        }
        for (flag, cause) in acknowledged.iter_mut().zip(causes.iter()) {
            if !*flag && predicate(cause) {
                *flag = true;
            }
        }
        acknowledged.iter().all(|flag| *flag)
    }

    /// Returns the settled failure causes not yet acknowledged via
    /// [`handle`](Self::handle).
    #[must_use]
    pub fn unacknowledged(&self) -> Vec<OperationError> {
        let outcome = self.shared.outcome.read();
        let causes = match outcome.as_ref() {
            Some(TaskOutcome::Failure(agg)) => &agg.causes,
            _ => return Vec::new(),
        };

        let acknowledged = self.shared.acknowledged.lock();
        causes
            .iter()
            .enumerate()
            .filter(|(i, _)| !acknowledged.get(*i).copied().unwrap_or(false))
            .map(|(_, cause)| cause.clone())
            .collect()
    }

    fn settle_outcome(&self, outcome: TaskOutcome<T>) -> bool {
        {
            let mut slot = self.shared.outcome.write();
            if slot.is_some() {
                warn!("aggregator already settled; outcome dropped");
                return false;
            }
            *slot = Some(outcome);
        }
        debug!("aggregator settled");
        self.shared.settled.notify_waiters();
        true
    }
}

impl<T: Clone> OutcomeAggregator<T> {
    /// Suspends until settlement and yields the outcome.
    ///
    /// Any number of observers receive the identical settled outcome.
    pub async fn observe(&self) -> TaskOutcome<T> {
        loop {
            let settled = self.shared.settled.notified();
            if let Some(outcome) = self.shared.outcome.read().clone() {
                return outcome;
            }
            settled.await;
        }
    }
}

impl<T: Clone + Send + Sync + 'static> OutcomeAggregator<T> {
    /// Adapts the aggregator into a deferred task settling with its
    /// outcome.
    #[must_use]
    pub fn into_task(self) -> DeferredTask<T> {
        let task = DeferredTask::pending();
        let handle = task.clone();
        tokio::spawn(async move {
            let outcome = self.observe().await;
            handle.settle(outcome);
        });
        task
    }
}

impl<T> std::fmt::Debug for OutcomeAggregator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeAggregator")
            .field("settled", &self.is_settled())
            .field("recorded", &self.shared.recorded.lock().len())
            .finish()
    }
}
