//! A streamed promise of [`MessagePromise`]s (§3).

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::promise::Promise;
use crate::streamed_promise::{StreamAppender, StreamIter, StreamedPromise};

use super::{Message, MessagePromise};

/// Awaiting a `MessageSequencePromise` yields the ordered tuple of resolved
/// [`Message`]s; iterating it yields [`MessagePromise`]s in delivery order
/// (§3). Built directly on [`StreamedPromise`] — a message sequence is just
/// a stream whose pieces happen to be message promises.
pub struct MessageSequencePromise {
    inner: StreamedPromise<MessagePromise>,
}

impl Clone for MessageSequencePromise {
    fn clone(&self) -> Self {
        MessageSequencePromise {
            inner: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for MessageSequencePromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSequencePromise").finish_non_exhaustive()
    }
}

impl MessageSequencePromise {
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(StreamAppender<MessagePromise>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        MessageSequencePromise {
            inner: StreamedPromise::new(producer),
        }
    }

    /// Like [`MessageSequencePromise::new`], cancelled when `cancel` fires —
    /// how a [`crate::context::Context`] reaches every agent invocation's
    /// output sequence on teardown.
    pub fn with_cancellation<F, Fut>(producer: F, cancel: CancellationToken) -> Self
    where
        F: FnOnce(StreamAppender<MessagePromise>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        MessageSequencePromise {
            inner: StreamedPromise::with_cancellation(producer, cancel),
        }
    }

    pub fn empty() -> Self {
        MessageSequencePromise {
            inner: StreamedPromise::empty(),
        }
    }

    /// A sequence of already-resolved messages — the common case for test
    /// doubles and for an agent's final assembled reply.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let messages: Vec<Message> = messages.into_iter().collect();
        MessageSequencePromise::new(|appender| async move {
            for message in messages {
                appender.append(MessagePromise::ready(message));
            }
            appender.close();
            Ok(())
        })
    }

    pub fn start(&self) {
        self.inner.start();
    }

    pub fn iter(&self) -> StreamIter<MessagePromise> {
        self.inner.iter()
    }

    /// Awaits every contained [`MessagePromise`] in delivery order, yielding
    /// the ordered tuple of resolved [`Message`]s (§3, §6 "trigger output").
    pub async fn messages(&self) -> Result<Vec<Message>, CoreError> {
        let promises = self.inner.collect().await?;
        let mut resolved = Vec::with_capacity(promises.len());
        for promise in promises {
            resolved.push(promise.get().await?);
        }
        Ok(resolved)
    }

    /// A promise resolving to every resolved message's textual payload,
    /// concatenated and separated by a blank line (§4.G).
    pub fn as_single_text_promise(&self) -> Promise<String> {
        let this = self.clone();
        Promise::new(async move {
            let messages = this.messages().await?;
            Ok(messages
                .iter()
                .map(Message::payload)
                .collect::<Vec<_>>()
                .join("\n\n"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_messages_replays_in_order() {
        let seq = MessageSequencePromise::from_messages(vec![Message::text("a"), Message::text("b")]);
        let first: Vec<_> = seq.messages().await.unwrap().iter().map(|m| m.payload().to_string()).collect();
        let second: Vec<_> = seq.messages().await.unwrap().iter().map(|m| m.payload().to_string()).collect();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn iter_yields_message_promises_in_delivery_order() {
        let seq = MessageSequencePromise::from_messages(vec![Message::text("first"), Message::text("second")]);
        let mut it = seq.iter();
        let p1 = it.next().await.unwrap().unwrap();
        let p2 = it.next().await.unwrap().unwrap();
        assert_eq!(p1.get().await.unwrap().payload(), "first");
        assert_eq!(p2.get().await.unwrap().payload(), "second");
        assert!(it.next().await.is_none());
    }

    #[tokio::test]
    async fn as_single_text_promise_joins_with_blank_line() {
        let seq = MessageSequencePromise::from_messages(vec![Message::text("one"), Message::text("two")]);
        let text = seq.as_single_text_promise().get().await.unwrap();
        assert_eq!(text, "one\n\ntwo");
    }

    #[tokio::test]
    async fn empty_sequence_yields_empty_output() {
        let seq = MessageSequencePromise::empty();
        assert_eq!(seq.messages().await.unwrap(), Vec::<Message>::new());
    }
}
