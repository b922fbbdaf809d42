//! Counting semaphore with FIFO waiters and strict over-release detection.

use crate::errors::TaskError;
use parking_lot::Mutex as StateLock;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use tracing::warn;

struct SemaphoreState {
    /// Permits currently available, always within `0..=capacity`.
    available: usize,
    /// Suspended acquirers in arrival order.
    waiters: VecDeque<Waiter>,
    /// Next waiter id.
    next_waiter_id: u64,
}

struct Waiter {
    id: u64,
    waker: Waker,
}

/// A bounded-concurrency gate.
///
/// `available` only changes via [`acquire`](CountingSemaphore::acquire)
/// (decrement, suspends at zero) and [`release`](CountingSemaphore::release)
/// (increment, capped at capacity). Releasing beyond the net acquire count
/// is a programming error and is rejected as [`TaskError::InvalidUse`].
///
/// Unlike [`AsyncMutex`](crate::sync::AsyncMutex), any caller may release
/// regardless of which caller acquired; this looser discipline is what
/// makes `capacity == 1` a mutex without the single-owner release
/// restriction. When the holder and releaser are the same scope, prefer
/// [`acquire_scoped`](CountingSemaphore::acquire_scoped), which guarantees
/// release on every exit path.
pub struct CountingSemaphore {
    state: StateLock<SemaphoreState>,
    capacity: usize,
}

impl CountingSemaphore {
    /// Creates a semaphore with the given capacity, all permits available.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "semaphore capacity must be at least 1");
        Self {
            state: StateLock::new(SemaphoreState {
                available: capacity,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
            }),
            capacity,
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of currently available permits.
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Returns the number of suspended acquirers.
    #[must_use]
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Acquires one permit, suspending until one is free.
    ///
    /// The caller owes exactly one matching [`release`](Self::release).
    pub fn acquire(&self) -> AcquireFuture<'_> {
        AcquireFuture {
            semaphore: self,
            waiter_id: None,
        }
    }

    /// Acquires one permit and wraps it in an RAII guard.
    ///
    /// The permit is returned on every exit path, including the one that
    /// fails while holding it.
    pub async fn acquire_scoped(&self) -> SemaphorePermit<'_> {
        self.acquire().await;
        SemaphorePermit { semaphore: self }
    }

    /// Attempts to take a permit without suspending.
    ///
    /// Fails when no permit is free or when waiters are already queued
    /// (no barging past the queue).
    #[must_use]
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        let mut state = self.state.lock();
        if state.available == 0 || !state.waiters.is_empty() {
            return None;
        }
        state.available -= 1;
        Some(SemaphorePermit { semaphore: self })
    }

    /// Returns one permit and wakes the front waiter, if any.
    ///
    /// Fails with [`TaskError::InvalidUse`] when the release would exceed
    /// the net acquire count; state is left untouched in that case.
    pub fn release(&self) -> Result<(), TaskError> {
        let mut state = self.state.lock();
        if state.available == self.capacity {
            warn!(
                capacity = self.capacity,
                "semaphore release without matching acquire"
            );
            return Err(TaskError::invalid_use(
                "semaphore released more times than acquired",
            ));
        }
        state.available += 1;
        if let Some(front) = state.waiters.front() {
            front.waker.wake_by_ref();
        }
        Ok(())
    }
}

impl std::fmt::Debug for CountingSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingSemaphore")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("pending_waiters", &self.pending_waiters())
            .finish()
    }
}

/// Future returned by [`CountingSemaphore::acquire`].
pub struct AcquireFuture<'a> {
    semaphore: &'a CountingSemaphore,
    waiter_id: Option<u64>,
}

impl Future for AcquireFuture<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.semaphore.state.lock();

        match this.waiter_id {
            None => {
                if state.available > 0 && state.waiters.is_empty() {
                    state.available -= 1;
                    return Poll::Ready(());
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
                // Strict FIFO: only the front waiter may take a permit.
                if state.available > 0 && state.waiters.front().map(|w| w.id) == Some(id) {
                    state.waiters.pop_front();
                    this.waiter_id = None;
                    state.available -= 1;
                    return Poll::Ready(());
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
            let mut state = self.semaphore.state.lock();
            let was_front = state.waiters.front().map(|w| w.id) == Some(id);
            state.waiters.retain(|w| w.id != id);
            if was_front && state.available > 0 {
                if let Some(front) = state.waiters.front() {
                    front.waker.wake_by_ref();
                }
            }
        }
    }
}

/// RAII permit from [`CountingSemaphore::acquire_scoped`].
#[must_use = "the permit is returned as soon as the guard is dropped"]
pub struct SemaphorePermit<'a> {
    semaphore: &'a CountingSemaphore,
}

impl SemaphorePermit<'_> {
    /// Returns the permit explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        // A live permit implies available < capacity, so this cannot
        // over-release.
        let _ = self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_decrements_available() {
        let sem = CountingSemaphore::new(3);
        sem.acquire().await;
        assert_eq!(sem.available(), 2);

        sem.release().expect("matching release");
        assert_eq!(sem.available(), 3);
    }

    #[tokio::test]
    async fn test_over_release_rejected() {
        let sem = CountingSemaphore::new(2);

        let result = sem.release();
        assert!(matches!(result, Err(TaskError::InvalidUse(_))));
        // State untouched.
        assert_eq!(sem.available(), 2);
    }

    #[tokio::test]
    async fn test_any_caller_may_release() {
        let sem = Arc::new(CountingSemaphore::new(1));
        sem.acquire().await;

        // A different task returns the permit.
        let releaser = sem.clone();
        tokio::spawn(async move {
            releaser.release().expect("cross-task release");
        })
        .await
        .expect("releaser panicked");

        assert_eq!(sem.available(), 1);
    }

    #[tokio::test]
    async fn test_scoped_permit_released_on_error_path() {
        let sem = Arc::new(CountingSemaphore::new(1));

        let result: Result<(), String> = {
            let _permit = sem.acquire_scoped().await;
            Err("failed while holding".to_string())
        };

        assert!(result.is_err());
        assert_eq!(sem.available(), 1);
    }

    #[tokio::test]
    async fn test_capacity_bounds_concurrency() {
        let sem = Arc::new(CountingSemaphore::new(3));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let sem = sem.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let permit = sem.acquire_scoped().await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }));
        }

        for handle in handles {
            handle.await.expect("holder task panicked");
        }

        assert!(max_inside.load(Ordering::SeqCst) <= 3);
        assert_eq!(sem.available(), 3);
    }

    #[tokio::test]
    async fn test_waiters_served_in_fifo_order() {
        let sem = Arc::new(CountingSemaphore::new(1));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let blocker = sem.acquire_scoped().await;

        let mut handles = Vec::new();
        for i in 0..4usize {
            let waiter_sem = sem.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let permit = waiter_sem.acquire_scoped().await;
                order.lock().push(i);
                drop(permit);
            }));
            while sem.pending_waiters() <= i {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        drop(blocker);

        for handle in handles {
            handle.await.expect("waiter task panicked");
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_capacity_one_emulates_mutex() {
        let sem = Arc::new(CountingSemaphore::new(1));
        sem.acquire().await;

        // Second acquirer suspends until the permit returns.
        let waiter = {
            let sem = sem.clone();
            tokio::spawn(async move {
                sem.acquire().await;
                sem.release().expect("release after acquire");
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        sem.release().expect("release held permit");
        waiter.await.expect("waiter panicked");
        assert_eq!(sem.available(), 1);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn test_zero_capacity_rejected() {
        let _ = CountingSemaphore::new(0);
    }
}
