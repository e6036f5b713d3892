//! Core error taxonomy: kinds, not language types.
//!
//! One `thiserror` enum covering every failure mode a caller of the
//! concurrency core can observe: context lifecycle misuse, invariant
//! violations, and the two terminal markers a producer's wrapper can attach
//! to a stream (`ProducerError`, `StreamCancelled`).

use thiserror::Error;

/// Errors surfaced by the Runtime Context, Promise, StreamedPromise,
/// FlatteningSequence, Message, and Agent invocation machinery.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    /// Operation requires an active Runtime Context but none is installed
    /// for the current task tree.
    #[error("no active runtime context")]
    NoActiveContext,

    /// `Context::activate()` called while a context is already active in
    /// the same task tree.
    #[error("a runtime context is already active in this task tree")]
    NestedContext,

    /// Operation attempted on a context that has begun finalizing.
    #[error("runtime context is closed (finalizing or finalized)")]
    ContextClosed,

    /// A framework invariant was violated: double resolution, a
    /// known-beforehand metadata mismatch, or mutation of a frozen message.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Generic wrapper around an exception raised by a user producer
    /// (Promise resolver, StreamedPromise producer, or Agent body).
    #[error("producer error: {0}")]
    ProducerError(String),

    /// Terminal marker for a producer cancelled by context teardown.
    #[error("stream cancelled")]
    StreamCancelled,
}

impl CoreError {
    /// Wraps an arbitrary displayable user error as a `ProducerError`.
    pub fn from_producer<E: std::fmt::Display>(err: E) -> Self {
        CoreError::ProducerError(err.to_string())
    }

    /// True for the two terminal-only markers that a consumer should treat
    /// as "the stream is over", as opposed to an invariant bug in the core
    /// itself.
    pub fn is_terminal_marker(&self) -> bool {
        matches!(self, CoreError::ProducerError(_) | CoreError::StreamCancelled)
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            CoreError::StreamCancelled
        } else {
            CoreError::ProducerError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::InvariantViolation(format!("serialization failed: {err}"))
    }
}
