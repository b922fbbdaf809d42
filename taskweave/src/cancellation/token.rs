//! The observer side of a cancellation pair.

use crate::errors::TaskError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

/// Shared state between a source and its tokens.
pub(super) struct CancelInner {
    /// Whether cancellation has been requested.
    requested: AtomicBool,
    /// Generation id of the owning source.
    generation: u64,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Callbacks to invoke on cancellation.
    callbacks: RwLock<Vec<CancelCallback>>,
}

impl CancelInner {
    pub(super) fn new(generation: u64) -> Self {
        Self {
            requested: AtomicBool::new(false),
            generation,
            reason: RwLock::new(None),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub(super) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub(super) fn generation(&self) -> u64 {
        self.generation
    }

    /// Flips the flag once; callbacks run on the first call only.
    pub(super) fn request(&self, reason: String) {
        if self
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason);

            let callbacks = self.callbacks.read();
            for callback in callbacks.iter() {
                if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    callback();
                })) {
                    warn!("Cancellation callback panicked: {:?}", e);
                }
            }
        }
    }
}

/// A token for cooperative cancellation.
///
/// Tokens are cheap to clone and safe to poll from any concurrent context.
/// They only signal; no resource cleanup is owned here.
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

impl CancellationToken {
    pub(super) fn from_inner(inner: Arc<CancelInner>) -> Self {
        Self { inner }
    }

    /// Returns whether cancellation has been requested.
    ///
    /// Non-blocking; once this returns true it stays true for this
    /// generation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_requested()
    }

    /// Fails with [`TaskError::Cancelled`] if cancellation was requested.
    ///
    /// Long-running loops call this at iteration boundaries to exit
    /// promptly.
    pub fn error_if_cancelled(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Returns the generation id of the owning source.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation()
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    /// Panics inside callbacks are logged and suppressed.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_cancelled() {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback();
            })) {
                warn!("Cancellation callback panicked: {:?}", e);
            }
        } else {
            self.inner.callbacks.write().push(Box::new(callback));
        }
    }
}

impl Clone for CancellationToken {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("generation", &self.generation())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
