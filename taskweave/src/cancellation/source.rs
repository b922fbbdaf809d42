//! The single-writer side of a cancellation pair.

use super::token::{CancelInner, CancellationToken};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Generation ids are globally monotonic so a token can always tell which
/// request round it belongs to.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// The exclusive writer of a cancellation request.
///
/// Only the source may flip the shared flag; any number of tokens derived
/// via [`CancellationSource::token`] observe it. Once requested, the flag
/// never reverts for this generation.
pub struct CancellationSource {
    inner: Arc<CancelInner>,
}

impl CancellationSource {
    /// Creates a new source with a fresh generation id.
    #[must_use]
    pub fn new() -> Self {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::new(CancelInner::new(generation)),
        }
    }

    /// Hands out a token observing this source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken::from_inner(self.inner.clone())
    }

    /// Requests cancellation with a reason.
    ///
    /// This is idempotent - only the first reason is kept and callbacks run
    /// exactly once. Subsequent and concurrent calls are no-ops.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.inner.request(reason.into());
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_requested()
    }

    /// Returns the generation id of this source.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSource")
            .field("generation", &self.generation())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_default_not_cancelled() {
        let source = CancellationSource::new();
        assert!(!source.is_cancelled());
    }

    #[test]
    fn test_generations_are_monotonic() {
        let first = CancellationSource::new();
        let second = CancellationSource::new();
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn test_cancel_idempotent() {
        let source = CancellationSource::new();
        let token = source.token();

        source.cancel("first");
        source.cancel("second");

        assert!(source.is_cancelled());
        // First reason wins
        assert_eq!(token.reason(), Some("first".to_string()));
    }

    #[test]
    fn test_many_tokens_observe_one_source() {
        let source = CancellationSource::new();
        let tokens: Vec<_> = (0..4).map(|_| source.token()).collect();

        source.cancel("stop");

        for token in &tokens {
            assert!(token.is_cancelled());
            assert_eq!(token.generation(), source.generation());
        }
    }
}
