//! Non-reentrant async mutex with FIFO waiter handoff.

use parking_lot::Mutex as StateLock;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// Internal state: holder flag plus the ordered wait queue.
struct MutexState {
    /// Whether the mutex is currently held.
    held: bool,
    /// Suspended acquirers in arrival order.
    waiters: VecDeque<Waiter>,
    /// Next waiter id.
    next_waiter_id: u64,
}

struct Waiter {
    id: u64,
    waker: Waker,
}

/// An exclusive-access primitive usable from suspendable code.
///
/// At most one holder exists at any instant. Waiters are served strictly
/// in arrival order: a release wakes the front waiter and nobody may barge
/// past it. Acquiring suspends the calling task without occupying a worker
/// thread.
///
/// The mutex is **not reentrant**. A task that acquires again while still
/// holding the guard deadlocks itself; that misuse is documented here and
/// covered by a timeout test rather than detected at runtime.
///
/// By convention the guarded block is the minimal non-suspending section
/// that *prepares* work (constructing a request, scheduling a task).
/// Awaiting the prepared work while still holding the guard stalls every
/// other acquirer and is forbidden.
pub struct AsyncMutex {
    state: StateLock<MutexState>,
}

impl AsyncMutex {
    /// Creates a new unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: StateLock::new(MutexState {
                held: false,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
            }),
        }
    }

    /// Acquires the mutex, suspending until it is free.
    ///
    /// Returns a guard that releases on drop, on every exit path.
    pub fn acquire(&self) -> AcquireFuture<'_> {
        AcquireFuture {
            mutex: self,
            waiter_id: None,
        }
    }

    /// Attempts to acquire without suspending.
    ///
    /// Fails when the mutex is held or when waiters are already queued
    /// (no barging past the queue).
    #[must_use]
    pub fn try_acquire(&self) -> Option<MutexGuard<'_>> {
        let mut state = self.state.lock();
        if state.held || !state.waiters.is_empty() {
            return None;
        }
        state.held = true;
        Some(MutexGuard { mutex: self })
    }

    /// Returns whether the mutex is currently held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Returns the number of suspended acquirers.
    #[must_use]
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Flips state back to free and wakes the front waiter, if any.
    fn unlock(&self) {
        let mut state = self.state.lock();
        state.held = false;
        if let Some(front) = state.waiters.front() {
            front.waker.wake_by_ref();
        }
    }
}

impl Default for AsyncMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AsyncMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMutex")
            .field("held", &self.is_held())
            .field("pending_waiters", &self.pending_waiters())
            .finish()
    }
}

/// Future returned by [`AsyncMutex::acquire`].
pub struct AcquireFuture<'a> {
    mutex: &'a AsyncMutex,
    waiter_id: Option<u64>,
}

impl<'a> Future for AcquireFuture<'a> {
    type Output = MutexGuard<'a>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.mutex.state.lock();

        match this.waiter_id {
            None => {
                // Fast path: free and nobody queued ahead of us.
                if !state.held && state.waiters.is_empty() {
                    state.held = true;
                    return Poll::Ready(MutexGuard { mutex: this.mutex });
                }

                let id = state.next_waiter_id;
                state.next_waiter_id = state.next_waiter_id.wrapping_add(1);
                state.waiters.push_back(Waiter {
                    id,
                    waker: cx.waker().clone(),
                });
                this.waiter_id = Some(id);
                Poll::Pending
            }
            Some(id) => {
                // Only the front waiter may take the lock.
                if !state.held && state.waiters.front().map(|w| w.id) == Some(id) {
                    state.waiters.pop_front();
                    this.waiter_id = None;
                    state.held = true;
                    return Poll::Ready(MutexGuard { mutex: this.mutex });
                }

                if let Some(existing) = state.waiters.iter_mut().find(|w| w.id == id) {
                    existing.waker = cx.waker().clone();
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for AcquireFuture<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.waiter_id {
            let mut state = self.mutex.state.lock();
            let was_front = state.waiters.front().map(|w| w.id) == Some(id);
            state.waiters.retain(|w| w.id != id);
            // A wakeup aimed at us must not be lost.
            if was_front && !state.held {
                if let Some(front) = state.waiters.front() {
                    front.waker.wake_by_ref();
                }
            }
        }
    }
}

/// RAII guard marking the holder of an [`AsyncMutex`].
///
/// Ownership of "being the holder" transfers only through acquire/release;
/// dropping the guard is the release.
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
    mutex: &'a AsyncMutex,
}

impl MutexGuard<'_> {
    /// Releases the mutex explicitly.
    ///
    /// Equivalent to dropping the guard; provided for call sites where the
    /// release point deserves a name.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
