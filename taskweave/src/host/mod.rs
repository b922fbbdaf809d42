//! Capability boundary with the host application.
//!
//! The toolkit never performs I/O or owns a computation of its own; the
//! host injects opaque operations and this module gives them deferred-task
//! shape. Marshaling back to a presentation context is likewise the
//! host's job and is deliberately absent here.

use crate::cancellation::CancellationToken;
use crate::errors::{OperationError, TaskError};
use crate::task::DeferredTask;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// An opaque source of remote text content, supplied by the host.
///
/// The toolkit never inspects the fetch; it only schedules and wraps it.
#[async_trait]
pub trait RemoteTextSource: Send + Sync {
    /// Fetches the text behind `url`.
    async fn fetch_text(&self, url: &str) -> Result<String, OperationError>;
}

/// Schedules an opaque CPU-bound computation on a background context.
pub fn run_cpu_bound<T, F>(op: F) -> DeferredTask<T>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    DeferredTask::schedule(move || Ok(op()), Duration::ZERO, None)
}

/// Wraps a remote fetch into a deferred task.
///
/// The delay elapses cooperatively before the fetch starts; cancellation
/// observed before the fetch begins settles the task as cancelled without
/// touching the source.
pub fn fetch_deferred(
    source: Arc<dyn RemoteTextSource>,
    url: impl Into<String>,
    delay: Duration,
    token: Option<CancellationToken>,
) -> DeferredTask<String> {
    let url = url.into();
    DeferredTask::spawn(
        move || async move { source.fetch_text(&url).await.map_err(TaskError::from) },
        delay,
        token,
    )
}
