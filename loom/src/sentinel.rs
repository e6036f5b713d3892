//! Typed markers used by the flattening pipeline and by placeholders.
//!
//! `Await` and `Clear` are input items a caller can splice into anything
//! accepted by [`crate::flatten::FlattenInput`]; `NoValue` marks a
//! [`crate::promise::Promise`] that exists but has not been resolved, either
//! externally or by a producer, distinct from any real `T` (including
//! `Option<T>::None`). `END_OF_STREAM` has no public representation — it is
//! the internal terminator appended to every piece log, see
//! [`crate::streamed_promise::log`].

/// A sentinel spliceable into a flattening sequence's input.
///
/// See `FlatteningSequence`'s emission-order rules: [`Sentinel::Await`] is a
/// synchronization barrier, [`Sentinel::Clear`] discards everything declared
/// before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sentinel {
    /// Suspend further emission until every background resolution started
    /// before this point has terminated.
    Await,
    /// Discard all items declared before this point (emitting nothing for
    /// them) and continue.
    Clear,
}

/// Placeholder for a [`crate::promise::Promise`] that has not been resolved
/// yet, distinct from `Option::None` (which is a legitimate resolved value
/// for `Promise<Option<T>>`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct NoValue;
