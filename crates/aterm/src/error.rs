//! The unified error channel for the ATerm subsystem.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ATermError>;

/// Everything that can go wrong while creating, inspecting or collecting terms.
#[derive(Debug, Error)]
pub enum ATermError {
    /// A supplied child count did not match the function symbol's arity.
    #[error("function symbol `{symbol}` has arity {expected}, but {actual} children were supplied")]
    ArityMismatch {
        symbol: String,
        expected: usize,
        actual: usize,
    },

    /// A storage's block allocator could not satisfy a request.
    #[error("term storage exhausted while allocating a slot for arity {arity}")]
    AllocationExhausted { arity: usize },

    /// A `verify_mark`/`verify_sweep` consistency check failed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The shared/exclusive lock was used in a way its contract forbids,
    /// e.g. a deletion hook tried to allocate a term.
    #[error("misuse of the shared/exclusive lock: {0}")]
    LockMisuse(String),
}
