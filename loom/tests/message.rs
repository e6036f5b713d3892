//! Integration coverage for `Message`/`MessagePromise`/`MessageSequencePromise`
//! exercised only through the public API (§4.F, §8 properties 1, 2, 6).

use std::collections::BTreeMap;

use loom::{Message, MessageKind, MessagePromise, MessageSequencePromise, Role};

#[test]
fn identical_content_hashes_to_the_same_key() {
    let a = Message::text("hello");
    let b = Message::text("hello");
    assert_eq!(a.hash_key(), b.hash_key());

    let c = Message::assistant("hello");
    assert_ne!(a.hash_key(), c.hash_key(), "role participates in the hash");
}

#[test]
fn serialize_then_deserialize_round_trips_and_reverifies_the_hash() {
    let nested = Message::text("child");
    let parent = Message::builder(MessageKind::Text)
        .payload("parent")
        .role(Role::User)
        .nested(nested)
        .build()
        .unwrap();

    let wire = parent.serialize();
    let restored = Message::deserialize(wire).unwrap();

    assert_eq!(restored.hash_key(), parent.hash_key());
    assert_eq!(restored.payload(), "parent");
    assert_eq!(restored.nested().len(), 1);
    assert_eq!(restored.nested()[0].payload(), "child");
}

#[test]
fn tampered_serialized_hash_is_rejected_on_deserialize() {
    let message = Message::text("original");
    let mut wire = message.serialize();
    wire.hash_key = "0".repeat(64);

    let err = Message::deserialize(wire).unwrap_err();
    assert!(matches!(err, loom::CoreError::InvariantViolation(_)));
}

#[tokio::test]
async fn text_stream_concatenates_fragments_into_the_final_payload() {
    let promise = MessagePromise::text_stream(Some(Role::Assistant), BTreeMap::new(), |tokens| async move {
        tokens.append("Hello, ");
        tokens.append("world!");
        tokens.close();
        Ok(())
    });

    let message = promise.get().await.unwrap();
    assert_eq!(message.payload(), "Hello, world!");
    assert_eq!(message.role(), Some(Role::Assistant));
}

#[tokio::test]
async fn known_beforehand_mismatch_is_an_invariant_violation() {
    let mut known = BTreeMap::new();
    known.insert("topic".to_string(), serde_json::json!("weather"));

    let promise = MessagePromise::new(known, |appender| async move {
        appender.close();
        Message::builder(MessageKind::Text)
            .payload("no topic field set")
            .field("topic", serde_json::json!("sports"))
            .build()
    });

    let err = promise.get().await.unwrap_err();
    assert!(matches!(err, loom::CoreError::InvariantViolation(_)));
}

#[tokio::test]
async fn ready_message_promise_is_immediately_gettable() {
    let promise = MessagePromise::ready(Message::text("instant"));
    assert_eq!(promise.get().await.unwrap().payload(), "instant");
}

#[tokio::test]
async fn sequence_from_messages_replays_in_order() {
    let seq = MessageSequencePromise::from_messages(vec![
        Message::text("one"),
        Message::text("two"),
        Message::text("three"),
    ]);

    let first: Vec<_> = seq.messages().await.unwrap().iter().map(|m| m.payload().to_string()).collect();
    let second: Vec<_> = seq.messages().await.unwrap().iter().map(|m| m.payload().to_string()).collect();
    assert_eq!(first, vec!["one".to_string(), "two".to_string(), "three".to_string()]);
    assert_eq!(second, first);
}

#[tokio::test]
async fn empty_sequence_collects_to_nothing() {
    let seq = MessageSequencePromise::empty();
    assert_eq!(seq.messages().await.unwrap().len(), 0);
}
