//! Settlement data model: outcomes, lifecycle states, and reports.

use crate::errors::{AggregateError, OperationError, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The lifecycle state of a deferred task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created but not yet handed to the scheduler.
    Created,
    /// Scheduled; the delay has not elapsed or the operation has not begun.
    Scheduled,
    /// The operation is running on a background context.
    Running,
    /// Settled; the outcome is final and immutable.
    Settled,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::Settled => write!(f, "settled"),
        }
    }
}

/// Which way a task settled, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The operation produced a value.
    Success,
    /// The operation failed.
    Failure,
    /// Cancellation was observed.
    Cancelled,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The terminal outcome of a task or aggregator.
///
/// Settlement happens exactly once; after that the outcome is immutable
/// and safely shared for reading. The failure arm carries the ordered
/// cause set; deferred tasks always settle a single cause, only the
/// aggregator combines several.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    /// The operation produced a value.
    Success(T),
    /// The operation failed with one or more causes.
    Failure(AggregateError),
    /// Cooperative cancellation was observed before or during the
    /// operation.
    Cancelled,
}

impl<T> TaskOutcome<T> {
    /// Wraps a single failure cause.
    #[must_use]
    pub fn failure(cause: OperationError) -> Self {
        Self::Failure(AggregateError::single(cause))
    }

    /// Returns true if the task settled with a value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true if the task settled with a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns true if the task settled as cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the settled value, if any.
    #[must_use]
    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the failure cause set, if any.
    #[must_use]
    pub fn failure_causes(&self) -> Option<&AggregateError> {
        match self {
            Self::Failure(causes) => Some(causes),
            _ => None,
        }
    }

    /// Returns which way the task settled.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success(_) => OutcomeKind::Success,
            Self::Failure(_) => OutcomeKind::Failure,
            Self::Cancelled => OutcomeKind::Cancelled,
        }
    }

    /// Converts into a standard result.
    ///
    /// A single-cause failure surfaces as [`TaskError::Failed`] so the
    /// original cause is not wrapped; multi-cause sets surface as
    /// [`TaskError::Aggregate`].
    pub fn into_result(self) -> Result<T, TaskError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(mut causes) => {
                if causes.causes.len() == 1 {
                    if let Some(cause) = causes.causes.pop() {
                        return Err(TaskError::Failed(cause));
                    }
                }
                Err(TaskError::Aggregate(causes))
            }
            Self::Cancelled => Err(TaskError::Cancelled),
        }
    }
}

impl<T> From<Result<T, TaskError>> for TaskOutcome<T> {
    /// Maps an operation's result onto a settlement.
    ///
    /// `TaskError::Cancelled` becomes the cancelled settlement so a
    /// looping operation can exit through
    /// [`error_if_cancelled`](crate::cancellation::CancellationToken::error_if_cancelled);
    /// every other error is captured as a failure.
    fn from(result: Result<T, TaskError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(TaskError::Cancelled) => Self::Cancelled,
            Err(TaskError::Failed(cause)) => Self::failure(cause),
            Err(TaskError::Aggregate(causes)) => Self::Failure(causes),
            Err(TaskError::InvalidUse(message)) => Self::failure(OperationError::new(message)),
        }
    }
}

/// Serializable summary of a task's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    /// The task id.
    pub task_id: Uuid,
    /// Current lifecycle state.
    pub state: TaskState,
    /// When the task was scheduled.
    pub scheduled_at: DateTime<Utc>,
    /// When the task settled, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    /// Which way the task settled, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeKind>,
    /// Failure messages, if the task failed.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl TaskReport {
    /// Returns the scheduled-to-settled duration in milliseconds, if
    /// settled.
    #[must_use]
    pub fn duration_ms(&self) -> Option<f64> {
        self.settled_at
            .map(|settled| (settled - self.scheduled_at).num_milliseconds() as f64)
    }

    /// Converts the report to a JSON value for structured logging.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "task_id": self.task_id.to_string(),
            "state": self.state,
            "scheduled_at": self.scheduled_at,
            "settled_at": self.settled_at,
            "outcome": self.outcome,
            "errors": self.errors,
            "duration_ms": self.duration_ms(),
        })
    }
}
