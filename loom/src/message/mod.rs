//! Immutable, content-addressed, structurally validated message values (§3, §4.F).
//!
//! `Message` is a closed algebraic family — a common base ([`MessageKind`],
//! payload, role, nested messages) plus named subtypes with their own
//! validated schema, the way the teacher's `ReActState`/`ToolCall` pair a
//! shared state type with small, closed variant sets. Construction is the
//! only way to produce a `Message`; there is no public mutator, so "once
//! constructed, a message is frozen" (§3) is enforced by the type rather
//! than by a runtime check, and a nested message can never form a cycle
//! because it must already exist (by value) before the message that
//! references it can be built.

mod token;

pub mod promise;
pub mod sequence;

pub use promise::MessagePromise;
pub use sequence::MessageSequencePromise;
pub use token::Token;

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// The closed family of message subtypes (§4.F "common base plus named
/// subtypes"). Each variant's required fields are validated by
/// [`MessageBuilder::build`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text content, optionally tagged with a role.
    Text,
    /// A system-role message; `role` is forced to `Role::System`.
    System,
    /// Synthetic error carrier used by `errors_as_messages` (§4.G) — carries
    /// the producer exception's type name and string form as the payload.
    Error,
}

/// Conversational role tag (§3 "optional role tag").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

struct MessageInner {
    kind: MessageKind,
    role: Option<Role>,
    payload: String,
    fields: BTreeMap<String, Value>,
    nested: Vec<Message>,
    hash_key: OnceLock<String>,
}

/// An immutable, content-addressed message. Cheap to clone (an `Arc` clone);
/// equality and hashing are both defined by [`Message::hash_key`] (§3).
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.inner.kind)
            .field("role", &self.inner.role)
            .field("payload", &self.inner.payload)
            .field("hash_key", &self.hash_key())
            .finish()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.hash_key() == other.hash_key()
    }
}
impl Eq for Message {}

impl std::hash::Hash for Message {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash_key().hash(state);
    }
}

impl Message {
    /// Starts building a message of the given kind.
    pub fn builder(kind: MessageKind) -> MessageBuilder {
        MessageBuilder {
            kind,
            role: None,
            payload: String::new(),
            fields: BTreeMap::new(),
            nested: Vec::new(),
        }
    }

    /// Convenience: a user-role text message (the default conversion target
    /// for a bare string/scalar accepted by a `FlatteningSequence`, §4.E).
    pub fn text(payload: impl Into<String>) -> Message {
        Message::builder(MessageKind::Text)
            .payload(payload)
            .role(Role::User)
            .build()
            .expect("a role-tagged text message always validates")
    }

    /// Convenience: an assistant-role text message.
    pub fn assistant(payload: impl Into<String>) -> Message {
        Message::builder(MessageKind::Text)
            .payload(payload)
            .role(Role::Assistant)
            .build()
            .expect("a role-tagged text message always validates")
    }

    /// Builds the synthetic error-bearing message `errors_as_messages`
    /// appends to a producer's output (§4.G, scenario 6).
    pub fn from_error(error_type: impl Into<String>, display: impl Into<String>) -> Message {
        let error_type = error_type.into();
        let display = display.into();
        Message::builder(MessageKind::Error)
            .payload(format!("{error_type}: {display}"))
            .field("error_type", Value::String(error_type))
            .build()
            .expect("error messages always carry error_type")
    }

    pub fn kind(&self) -> MessageKind {
        self.inner.kind
    }

    pub fn role(&self) -> Option<Role> {
        self.inner.role
    }

    pub fn payload(&self) -> &str {
        &self.inner.payload
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.inner.fields.get(name)
    }

    pub fn nested(&self) -> &[Message] {
        &self.inner.nested
    }

    /// Deterministic content hash: lowercase hex sha-256 of the canonical
    /// encoding (§4.F), computed on first access and cached.
    pub fn hash_key(&self) -> &str {
        self.inner.hash_key.get_or_init(|| {
            let canonical = self.canonical_value();
            let bytes = serde_json::to_vec(&canonical).expect("canonical value always serializes");
            let digest = Sha256::digest(&bytes);
            hex::encode(digest)
        })
    }

    fn canonical_value(&self) -> Value {
        let mut fields = serde_json::Map::new();
        for (k, v) in &self.inner.fields {
            fields.insert(k.clone(), v.clone());
        }
        serde_json::json!({
            "kind": self.inner.kind,
            "role": self.inner.role,
            "payload": self.inner.payload,
            "fields": fields,
            "nested": self.inner.nested.iter().map(|m| m.hash_key().to_string()).collect::<Vec<_>>(),
        })
    }

    /// A structured record sufficient to reconstruct this message, with
    /// nested messages recorded both by hash reference and as a content
    /// sidecar (§4.F "round-trip law", §8 property 1).
    pub fn serialize(&self) -> SerializedMessage {
        SerializedMessage {
            kind: self.inner.kind,
            role: self.inner.role,
            payload: self.inner.payload.clone(),
            fields: self.inner.fields.clone(),
            nested_refs: self.inner.nested.iter().map(|m| m.hash_key().to_string()).collect(),
            nested_sidecar: self.inner.nested.iter().map(|m| m.serialize()).collect(),
            hash_key: self.hash_key().to_string(),
        }
    }

    /// Reconstructs a `Message` from its serialized form, validating that
    /// the stored `hash_key` matches the recomputed one.
    pub fn deserialize(record: SerializedMessage) -> Result<Message, CoreError> {
        let mut builder = Message::builder(record.kind);
        builder = builder.payload(record.payload);
        if let Some(role) = record.role {
            builder = builder.role(role);
        }
        for (k, v) in record.fields {
            builder = builder.field(k, v);
        }
        for nested in record.nested_sidecar {
            builder = builder.nested(Message::deserialize(nested)?);
        }
        let message = builder.build()?;
        if message.hash_key() != record.hash_key {
            return Err(CoreError::InvariantViolation(format!(
                "hash_key mismatch on deserialize: expected {}, recomputed {}",
                record.hash_key,
                message.hash_key()
            )));
        }
        Ok(message)
    }
}

/// Wire form of a [`Message`] (§4.F serialization).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializedMessage {
    pub kind: MessageKind,
    pub role: Option<Role>,
    pub payload: String,
    pub fields: BTreeMap<String, Value>,
    /// Nested messages referenced by hash key …
    pub nested_refs: Vec<String>,
    /// … plus a content sidecar sufficient to reconstruct each of them,
    /// "at the implementation's discretion" (§4.F).
    pub nested_sidecar: Vec<SerializedMessage>,
    pub hash_key: String,
}

/// Builder enforcing each [`MessageKind`]'s schema on [`MessageBuilder::build`].
pub struct MessageBuilder {
    kind: MessageKind,
    role: Option<Role>,
    payload: String,
    fields: BTreeMap<String, Value>,
    nested: Vec<Message>,
}

impl MessageBuilder {
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Attaches an already-constructed nested message. Because `nested` must
    /// already exist as a value, a message can never reference one that
    /// doesn't yet exist — cycles are impossible by construction (§3).
    pub fn nested(mut self, message: Message) -> Self {
        self.nested.push(message);
        self
    }

    /// Validates this kind's schema and freezes the result.
    pub fn build(mut self) -> Result<Message, CoreError> {
        match self.kind {
            MessageKind::System => {
                self.role = Some(Role::System);
            }
            MessageKind::Error => {
                if !self.fields.contains_key("error_type") {
                    return Err(CoreError::InvariantViolation(
                        "error message missing required field error_type".to_string(),
                    ));
                }
            }
            MessageKind::Text => {}
        }
        Ok(Message {
            inner: Arc::new(MessageInner {
                kind: self.kind,
                role: self.role,
                payload: self.payload,
                fields: self.fields,
                nested: self.nested,
                hash_key: OnceLock::new(),
            }),
        })
    }
}
