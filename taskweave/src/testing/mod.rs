//! Test support: outcome assertions and logging setup.

use crate::task::TaskOutcome;
use std::sync::Once;

static LOGGING: Once = Once::new();

/// Initializes tracing output for tests.
///
/// Safe to call from every test; only the first call installs the
/// subscriber.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Asserts that the outcome is a success with the expected value.
pub fn assert_outcome_success<T: PartialEq + std::fmt::Debug>(
    outcome: &TaskOutcome<T>,
    expected: &T,
) {
    match outcome {
        TaskOutcome::Success(value) => assert_eq!(
            value, expected,
            "Expected success with {expected:?}, got {value:?}"
        ),
        other => panic!("Expected success, got {other:?}"),
    }
}

/// Asserts that the outcome is a failure, returning the cause messages.
pub fn assert_outcome_failed<T: std::fmt::Debug>(outcome: &TaskOutcome<T>) -> Vec<String> {
    match outcome {
        TaskOutcome::Failure(causes) => {
            causes.causes.iter().map(ToString::to_string).collect()
        }
        other => panic!("Expected failure, got {other:?}"),
    }
}

/// Asserts that the outcome is cancelled.
pub fn assert_outcome_cancelled<T: std::fmt::Debug>(outcome: &TaskOutcome<T>) {
    assert!(
        outcome.is_cancelled(),
        "Expected cancelled, got {outcome:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OperationError;

    #[test]
    fn test_assert_success_passes() {
        let outcome = TaskOutcome::Success(3);
        assert_outcome_success(&outcome, &3);
    }

    #[test]
    #[should_panic(expected = "Expected success")]
    fn test_assert_success_rejects_failure() {
        let outcome: TaskOutcome<i32> = TaskOutcome::failure(OperationError::new("nope"));
        assert_outcome_success(&outcome, &3);
    }

    #[test]
    fn test_assert_failed_returns_messages() {
        let outcome: TaskOutcome<i32> = TaskOutcome::failure(OperationError::new("broken"));
        assert_eq!(assert_outcome_failed(&outcome), vec!["broken".to_string()]);
    }

    #[test]
    fn test_logging_init_is_idempotent() {
        init_test_logging();
        init_test_logging();
    }
}
