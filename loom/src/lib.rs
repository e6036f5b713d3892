//! # Loom
//!
//! The concurrency core for composing LLM-driven agents that exchange token
//! and message streams: a replayable streamed-promise primitive, a
//! hierarchical message-sequence flattener that resolves arbitrarily nested
//! structures into a flat ordered stream in the background, eager
//! ("start-soon") task scheduling, and the agent invocation protocol built
//! on top of these.
//!
//! Concrete LLM client bindings, chat-history persistence, console I/O
//! agents, and user-facing CLIs are external collaborators: an LLM agent is
//! just an ordinary [`Agent`] that happens to stream tokens through a
//! [`MessagePromise`](message::MessagePromise). None of that is this crate's
//! concern.
//!
//! ## Design principles
//!
//! - **Replayable streams**: every [`StreamedPromise`] runs its producer at
//!   most once; any number of independent iterators — including ones
//!   created after the producer finished — replay the full piece sequence
//!   from the beginning. Fan-out (logger, downstream agent, user) is free.
//! - **Eager flattening**: a [`FlatteningSequence`] walks a heterogeneous,
//!   possibly-nested input left to right and starts resolving every nested
//!   promise/sequence the moment it's declared, so sibling positions
//!   genuinely run concurrently underneath strict output ordering.
//! - **Immutable, content-addressed messages**: a [`Message`] is frozen at
//!   construction; its [`Message::hash_key`] is a lazily-computed,
//!   deterministic sha-256 over a canonical encoding. Cycles through nested
//!   messages are impossible by construction.
//! - **Ambient or explicit context, your choice**: [`Context`] is available
//!   through `Context::current()` for code that doesn't want to plumb it
//!   through every call, or threaded explicitly via
//!   [`InteractionContext::context`] and the `*_in` family of `Agent`
//!   methods.
//!
//! ## Main modules
//!
//! - [`promise`]: [`Promise`] — single-shot, memoized future.
//! - [`streamed_promise`]: [`StreamedPromise`], [`StreamAppender`] —
//!   replayable, producer-driven piece streams.
//! - [`flatten`]: [`FlatteningSequence`], [`FlattenInput`], [`FlattenAppender`],
//!   [`Order`] — the nested-input flattener and its strict/as-ready position
//!   scheduler.
//! - [`message`]: [`Message`], [`MessageBuilder`], [`MessageKind`], [`Role`],
//!   [`Token`], [`MessagePromise`], [`MessageSequencePromise`].
//! - [`agent`]: [`Agent`], [`InteractionContext`], [`AgentCall`] — the
//!   invocation protocol.
//! - [`context`]: [`Context`], [`ContextBuilder`], [`ContextFlags`],
//!   [`PersistenceHook`] — the runtime scheduler and its policies.
//! - [`sentinel`]: [`Sentinel`], [`NoValue`] — `AWAIT`/`CLEAR` and the
//!   unresolved-placeholder marker.
//! - [`error`]: [`CoreError`] — the error taxonomy.
//!
//! Key types are re-exported at crate root.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use loom::{Agent, Context, InteractionContext, Message};
//!
//! #[derive(Clone, Default)]
//! struct NoConfig;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let echo = Agent::new("echo", |ctx: InteractionContext, _cfg: NoConfig| async move {
//!     let mut pieces = ctx.input().iter();
//!     while let Some(piece) = pieces.next().await {
//!         let message = piece?.get().await?;
//!         ctx.reply(Message::text(format!("You said: {}", message.payload())));
//!     }
//!     Ok(())
//! });
//!
//! let ctx = Context::new();
//! ctx.run(|ctx| async move {
//!     let out = echo.trigger_in(&ctx, vec!["Hello", "World"], |c| c);
//!     for message in out.messages().await.unwrap() {
//!         println!("{}", message.payload());
//!     }
//! })
//! .await
//! .unwrap();
//! # }
//! ```

pub mod agent;
pub mod context;
pub mod error;
pub mod flatten;
pub mod message;
pub mod promise;
pub mod sentinel;
pub mod streamed_promise;

pub use agent::{Agent, AgentCall, InteractionContext};
pub use context::{Context, ContextBuilder, ContextFlags, PersistenceHook};
pub use error::CoreError;
pub use flatten::{FlattenAppender, FlattenInput, FlatteningSequence, Order};
pub use message::{
    Message, MessageBuilder, MessageKind, MessagePromise, MessageSequencePromise, Role,
    SerializedMessage, Token,
};
pub use promise::{Promise, PromiseSetter};
pub use sentinel::{NoValue, Sentinel};
pub use streamed_promise::{StreamAppender, StreamIter, StreamedPromise};

/// Initializes `tracing` from `RUST_LOG` (default `warn`) so `cargo test`
/// runs can print spans/events with `--nocapture`, mirroring the teacher's
/// `test_logging` ctor.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
