//! Cooperative cancellation primitives.
//!
//! This module provides:
//! - `CancellationSource`, the single writer that requests cancellation
//! - `CancellationToken`, a cheap clonable observer of that request
//!
//! Cancellation is advisory: in-flight work is never interrupted, it is
//! asked to exit at its next token check.

mod source;
mod token;

pub use source::CancellationSource;
pub use token::{CancelCallback, CancellationToken};

/// Creates a fresh source together with one token observing it.
#[must_use]
pub fn cancellation_pair() -> (CancellationSource, CancellationToken) {
    let source = CancellationSource::new();
    let token = source.token();
    (source, token)
}
