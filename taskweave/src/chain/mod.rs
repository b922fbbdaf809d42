//! Sequential continuation chains over deferred tasks.

mod builder;

pub use builder::ContinuationChain;

use crate::task::DeferredTask;

/// Starts a continuation chain from an initial task.
///
/// Convenience alias for [`ContinuationChain::new`].
#[must_use]
pub fn chain<T: Clone + Send + Sync + 'static>(initial: DeferredTask<T>) -> ContinuationChain<T> {
    ContinuationChain::new(initial)
}
