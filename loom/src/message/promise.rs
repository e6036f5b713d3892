//! A promise resolving to a [`super::Message`], paired with a token stream
//! and synchronously-readable known-beforehand metadata (§3, §4.F).

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::CoreError;
use crate::promise::Promise;
use crate::streamed_promise::{StreamAppender, StreamedPromise};

use super::token::Token;
use super::{Message, MessageKind, Role};

/// A [`MessagePromise`]'s resolved [`Message`] and its token stream are
/// driven by the same producer task, so "run at most once" applies to both
/// halves together — there is no way to drive the tokens without also
/// settling the message, or vice versa.
pub struct MessagePromise {
    message: Promise<Message>,
    tokens: StreamedPromise<Token>,
    known_beforehand: Arc<BTreeMap<String, Value>>,
}

impl Clone for MessagePromise {
    fn clone(&self) -> Self {
        MessagePromise {
            message: self.message.clone(),
            tokens: self.tokens.clone(),
            known_beforehand: Arc::clone(&self.known_beforehand),
        }
    }
}

impl std::fmt::Debug for MessagePromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePromise").finish_non_exhaustive()
    }
}

impl MessagePromise {
    /// General constructor: `producer` receives the token push handle and
    /// must itself close (or fail) the token stream, then return the
    /// resolved [`Message`]. Before the message is memoized, every declared
    /// `known_beforehand` field is checked against it — a mismatch is an
    /// `InvariantViolation`, never silently ignored (§4.F).
    pub fn new<F, Fut>(known_beforehand: BTreeMap<String, Value>, producer: F) -> Self
    where
        F: FnOnce(StreamAppender<Token>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Message, CoreError>> + Send + 'static,
    {
        let (message, setter) = Promise::pending();
        let known = Arc::new(known_beforehand);
        let known_for_producer = Arc::clone(&known);

        let tokens = StreamedPromise::new(move |appender| async move {
            match producer(appender).await {
                Ok(resolved) => {
                    let mut mismatch = None;
                    for (field, expected) in known_for_producer.iter() {
                        if resolved.field(field) != Some(expected) {
                            mismatch = Some((field.clone(), expected.clone()));
                            break;
                        }
                    }
                    if let Some((field, expected)) = mismatch {
                        let err = CoreError::InvariantViolation(format!(
                            "known-beforehand field {field:?} expected {expected:?} but message resolved with {:?}",
                            resolved.field(&field)
                        ));
                        let _ = setter.fail(err.clone()).await;
                        return Err(err);
                    }
                    let _ = setter.resolve(resolved).await;
                    Ok(())
                }
                Err(err) => {
                    let _ = setter.fail(err.clone()).await;
                    Err(err)
                }
            }
        });

        MessagePromise {
            message,
            tokens,
            known_beforehand: known,
        }
    }

    /// A convenience constructor for text-producing agents: `produce`
    /// receives a [`TokenAppender`] and the resolved message's payload is
    /// the concatenation of every fragment it appended, plus the declared
    /// `known_beforehand` fields (§3 "payload equals the concatenation of
    /// its streamed tokens plus any structured metadata supplied at
    /// construction").
    pub fn text_stream<F, Fut>(
        role: Option<Role>,
        known_beforehand: BTreeMap<String, Value>,
        produce: F,
    ) -> Self
    where
        F: FnOnce(TokenAppender) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        let fields_for_build = known_beforehand.clone();
        MessagePromise::new(known_beforehand, move |appender| async move {
            let buffer = Arc::new(Mutex::new(String::new()));
            let recording = TokenAppender {
                inner: appender,
                buffer: Arc::clone(&buffer),
            };
            produce(recording).await?;
            let payload = buffer.lock().expect("token buffer poisoned").clone();
            let mut builder = Message::builder(MessageKind::Text).payload(payload);
            if let Some(role) = role {
                builder = builder.role(role);
            }
            for (field, value) in fields_for_build {
                builder = builder.field(field, value);
            }
            builder.build()
        })
    }

    /// An already-resolved message with no meaningful streaming phase: its
    /// token stream yields the whole payload as a single fragment (or
    /// nothing, if the payload is empty) and closes immediately.
    pub fn ready(message: Message) -> Self {
        let for_tokens = message.clone();
        MessagePromise::new(BTreeMap::new(), move |appender| async move {
            if !for_tokens.payload().is_empty() {
                appender.append(Token::new(for_tokens.payload()));
            }
            appender.close();
            Ok(for_tokens)
        })
    }

    /// Awaits the resolved message, as a plain [`Promise::get`] would.
    pub async fn get(&self) -> Result<Message, CoreError> {
        self.message.get().await
    }

    /// The background stream of content fragments (§3).
    pub fn tokens(&self) -> &StreamedPromise<Token> {
        &self.tokens
    }

    /// A field value guaranteed present on the resolved message, readable
    /// without awaiting (§4.F).
    pub fn known_beforehand(&self, field: &str) -> Option<&Value> {
        self.known_beforehand.get(field)
    }

    /// Eagerly schedules the producer ("start soon", §4.A).
    pub fn start(&self) {
        self.tokens.start();
    }
}

/// Push handle passed to a [`MessagePromise::text_stream`] producer. Mirrors
/// [`StreamAppender`]'s contract but additionally accumulates the payload
/// that becomes the resolved message's final text.
pub struct TokenAppender {
    inner: StreamAppender<Token>,
    buffer: Arc<Mutex<String>>,
}

impl TokenAppender {
    pub fn append(&self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        self.buffer
            .lock()
            .expect("token buffer poisoned")
            .push_str(&fragment);
        self.inner.append(Token::new(fragment));
    }

    pub fn append_error(&self, err: CoreError) {
        self.inner.append_error(err);
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[tokio::test]
    async fn ready_resolves_immediately_and_streams_payload_as_one_token() {
        let p = MessagePromise::ready(Message::text("hi"));
        assert_eq!(p.get().await.unwrap().payload(), "hi");
        let mut it = p.tokens().iter();
        assert_eq!(it.next().await, Some(Ok(Token::new("hi"))));
        assert_eq!(it.next().await, None);
    }

    #[tokio::test]
    async fn text_stream_concatenates_fragments_into_payload() {
        let p = MessagePromise::text_stream(Some(Role::Assistant), BTreeMap::new(), |tokens| async move {
            tokens.append("Hello, ");
            tokens.append("world");
            tokens.close();
            Ok(())
        });
        let message = p.get().await.unwrap();
        assert_eq!(message.payload(), "Hello, world");
        assert_eq!(message.role(), Some(Role::Assistant));
    }

    /// **Property 6**: `(await P).fields ⊇ K` for declared known-beforehand K.
    #[tokio::test]
    async fn known_beforehand_field_is_present_on_resolution() {
        let mut known = BTreeMap::new();
        known.insert("not_for_user".to_string(), Value::Bool(true));
        let p = MessagePromise::text_stream(None, known.clone(), |tokens| async move {
            tokens.append("secret");
            tokens.close();
            Ok(())
        });
        assert_eq!(p.known_beforehand("not_for_user"), Some(&Value::Bool(true)));
        let message = p.get().await.unwrap();
        assert_eq!(message.field("not_for_user"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn known_beforehand_mismatch_is_invariant_violation() {
        let mut known = BTreeMap::new();
        known.insert("role_hint".to_string(), Value::String("assistant".to_string()));
        let p = MessagePromise::new(known, |appender| async move {
            appender.close();
            Message::builder(MessageKind::Text)
                .payload("oops")
                .field("role_hint", Value::String("user".to_string()))
                .build()
        });
        let err = p.get().await.unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation(_)));
    }
}
