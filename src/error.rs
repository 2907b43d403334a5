//! Error taxonomy.
//!
//! Transport failures are the only recoverable-looking errors in the system,
//! and even those are fatal: they propagate to the driver, which terminates.
//! Caller contract violations (rank out of range, joining overlapping trees,
//! inserting non-positive weights) are programming errors and are checked
//! with `debug_assert!` rather than surfaced as `Result`s.

use thiserror::Error;

/// A failure of the message-passing fabric.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CommError {
    /// A peer hung up mid-collective, typically because its thread panicked.
    #[error("worker {0} disconnected")]
    Disconnected(usize),

    /// A received message had an unexpected payload type.  All workers must
    /// execute the same sequence of collectives in program order; seeing the
    /// wrong type means they have diverged.
    #[error("collective payload type mismatch (worker {0} out of step)")]
    OutOfStep(usize),
}

/// Top-level error type of the crate.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum Error {
    #[error("transport failure: {0}")]
    Comm(#[from] CommError),
}
