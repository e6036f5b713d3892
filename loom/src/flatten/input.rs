//! The heterogeneous, possibly-nested item shapes a [`super::FlatteningSequence`]
//! accepts (§4.E, §6 "Trigger input").

use crate::message::{Message, MessagePromise, MessageSequencePromise};
use crate::promise::Promise;
use crate::sentinel::Sentinel;

/// A single accepted input item, recursively. Constructing one of these
/// does not itself start any resolution — that happens once it is declared
/// to a [`super::FlatteningSequence`] via [`super::FlattenAppender::push`] /
/// [`super::FlattenAppender::push_out_of_order`].
#[derive(Clone)]
pub enum FlattenInput {
    /// A message, emitted as an already-ready [`MessagePromise`].
    Message(Message),
    /// A scalar, converted to the default text message type then emitted.
    Text(String),
    /// Emitted as-is.
    MessagePromise(MessagePromise),
    /// A nested sequence, iterated in its own order and spliced in place.
    Sequence(MessageSequencePromise),
    /// A finite list of accepted items, flattened left-to-right,
    /// depth-first (§8 property 5).
    Many(Vec<FlattenInput>),
    /// A promise resolving to any of the other variants, awaited in the
    /// background; on resolution its content is flattened in place —
    /// including the case where it resolves to another `Many`/`Sequence`,
    /// which needs no special-casing since resolution simply recurses
    /// (§4.E(v) "transparent splicing, no double-flattening overhead").
    Deferred(Promise<FlattenInput>),
    /// A synchronization/reset marker, meaningful only at the position
    /// stream a [`super::FlatteningSequence`] declares items into.
    Sentinel(Sentinel),
}

impl FlattenInput {
    /// Wraps a typed `Promise<T>` as a `Promise<FlattenInput>`-backed
    /// deferred item, the general form of "a Promise resolving to any of
    /// the above" (§4.E).
    pub fn deferred<T>(promise: Promise<T>) -> FlattenInput
    where
        T: Into<FlattenInput> + Clone + Send + Sync + 'static,
    {
        let mapped = Promise::new(async move { promise.get().await.map(Into::into) });
        FlattenInput::Deferred(mapped)
    }
}

impl From<Message> for FlattenInput {
    fn from(message: Message) -> Self {
        FlattenInput::Message(message)
    }
}

impl From<&str> for FlattenInput {
    fn from(text: &str) -> Self {
        FlattenInput::Text(text.to_string())
    }
}

impl From<String> for FlattenInput {
    fn from(text: String) -> Self {
        FlattenInput::Text(text)
    }
}

impl From<MessagePromise> for FlattenInput {
    fn from(promise: MessagePromise) -> Self {
        FlattenInput::MessagePromise(promise)
    }
}

impl From<MessageSequencePromise> for FlattenInput {
    fn from(sequence: MessageSequencePromise) -> Self {
        FlattenInput::Sequence(sequence)
    }
}

impl From<Sentinel> for FlattenInput {
    fn from(sentinel: Sentinel) -> Self {
        FlattenInput::Sentinel(sentinel)
    }
}

impl<T: Into<FlattenInput>> From<Vec<T>> for FlattenInput {
    fn from(items: Vec<T>) -> Self {
        FlattenInput::Many(items.into_iter().map(Into::into).collect())
    }
}
