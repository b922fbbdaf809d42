//! Error types for the taskweave toolkit.
//!
//! The taxonomy distinguishes cooperative cancellation, a single wrapped
//! operation failure, an ordered set of concurrent sub-failures, and
//! contract misuse. Only the outcome aggregator is allowed to combine
//! multiple causes into one `AggregateError`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for taskweave operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Cooperative cancellation was observed.
    #[error("operation cancelled")]
    Cancelled,

    /// The wrapped opaque operation raised a failure.
    #[error("{0}")]
    Failed(#[from] OperationError),

    /// Multiple concurrent sub-operations failed.
    #[error("{0}")]
    Aggregate(#[from] AggregateError),

    /// The toolkit was used outside its contract (double settle,
    /// release without a matching acquire, and the like).
    #[error("invalid use: {0}")]
    InvalidUse(String),
}

impl TaskError {
    /// Creates an invalid-use error.
    #[must_use]
    pub fn invalid_use(message: impl Into<String>) -> Self {
        Self::InvalidUse(message.into())
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A single failure cause raised by an opaque operation.
///
/// The optional `kind` is a machine-readable discriminator (for example
/// `"network"` or `"timeout"`) used by [`AggregateError::handle`]
/// predicates; the message is for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct OperationError {
    /// Machine-readable failure kind.
    pub kind: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl OperationError {
    /// Creates a new operation error with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
        }
    }

    /// Creates a new operation error with a kind and a message.
    #[must_use]
    pub fn with_kind(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            message: message.into(),
        }
    }

    /// Returns true if this error carries the given kind.
    #[must_use]
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }
}

fn join_causes(causes: &[OperationError]) -> String {
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// An ordered set of failure causes from concurrently failing operations.
///
/// The set preserves the order in which causes were recorded and is never
/// empty: a successful outcome carries no `AggregateError` at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{} sub-operation(s) failed: {}", .causes.len(), join_causes(.causes))]
pub struct AggregateError {
    /// The ordered failure causes.
    pub causes: Vec<OperationError>,
}

impl AggregateError {
    /// Creates an aggregate from an ordered list of causes.
    #[must_use]
    pub fn new(causes: Vec<OperationError>) -> Self {
        Self { causes }
    }

    /// Creates an aggregate holding a single cause.
    #[must_use]
    pub fn single(cause: OperationError) -> Self {
        Self {
            causes: vec![cause],
        }
    }

    /// Returns the number of causes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.causes.len()
    }

    /// Returns true if there are no causes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    /// Acknowledges every cause matched by `predicate`.
    ///
    /// Returns `Ok(())` when all causes were acknowledged; otherwise the
    /// unacknowledged subset is returned as the error so it still surfaces
    /// to the caller.
    pub fn handle<F>(&self, predicate: F) -> Result<(), AggregateError>
    where
        F: Fn(&OperationError) -> bool,
    {
        let remaining: Vec<OperationError> = self
            .causes
            .iter()
            .filter(|cause| !predicate(cause))
            .cloned()
            .collect();

        if remaining.is_empty() {
            Ok(())
        } else {
            Err(AggregateError::new(remaining))
        }
    }
}

impl From<OperationError> for AggregateError {
    fn from(cause: OperationError) -> Self {
        Self::single(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_display() {
        let err = OperationError::new("connection refused");
        assert_eq!(err.to_string(), "connection refused");
        assert!(err.kind.is_none());
    }

    #[test]
    fn test_operation_error_kind() {
        let err = OperationError::with_kind("network", "connection refused");
        assert!(err.is_kind("network"));
        assert!(!err.is_kind("timeout"));
    }

    #[test]
    fn test_aggregate_display_lists_causes() {
        let agg = AggregateError::new(vec![
            OperationError::new("first"),
            OperationError::new("second"),
        ]);
        let rendered = agg.to_string();
        assert!(rendered.contains("2 sub-operation(s) failed"));
        assert!(rendered.contains("first"));
        assert!(rendered.contains("second"));
    }

    #[test]
    fn test_aggregate_handle_all_acknowledged() {
        let agg = AggregateError::new(vec![
            OperationError::with_kind("network", "refused"),
            OperationError::with_kind("network", "reset"),
        ]);

        assert!(agg.handle(|cause| cause.is_kind("network")).is_ok());
    }

    #[test]
    fn test_aggregate_handle_surfaces_unacknowledged() {
        let agg = AggregateError::new(vec![
            OperationError::with_kind("network", "refused"),
            OperationError::with_kind("timeout", "deadline elapsed"),
        ]);

        let result = agg.handle(|cause| cause.is_kind("network"));
        let remaining = result.expect_err("timeout cause should survive");
        assert_eq!(remaining.len(), 1);
        assert!(remaining.causes[0].is_kind("timeout"));
    }

    #[test]
    fn test_task_error_from_operation_error() {
        let err: TaskError = OperationError::new("boom").into();
        assert!(matches!(err, TaskError::Failed(_)));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_task_error_serde_cause_roundtrip() {
        let cause = OperationError::with_kind("network", "refused");
        let json = serde_json::to_string(&cause).expect("serialize");
        let back: OperationError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cause, back);
    }
}
