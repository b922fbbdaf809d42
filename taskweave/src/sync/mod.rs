//! Suspension-friendly mutual exclusion primitives.
//!
//! This module provides:
//! - `AsyncMutex`, a non-reentrant exclusive lock with FIFO handoff
//! - `CountingSemaphore`, a bounded-concurrency gate with FIFO waiters
//!
//! Both suspend the calling task without blocking an underlying worker
//! thread. The guarded block is expected to be the minimal non-suspending
//! section that prepares work; awaiting that work happens after release.

mod mutex;
mod semaphore;

pub use mutex::{AcquireFuture as MutexAcquireFuture, AsyncMutex, MutexGuard};
pub use semaphore::{
    AcquireFuture as SemaphoreAcquireFuture, CountingSemaphore, SemaphorePermit,
};
