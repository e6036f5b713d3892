//! Agent abstraction and its invocation protocol (§4.G).
//!
//! An [`Agent`] wraps a producer function of `(InteractionContext, Config)`.
//! `trigger` is non-blocking: it builds the input [`FlatteningSequence`],
//! schedules the producer under the current [`Context`] at the next
//! cooperative yield ("start soon", §4.A), and returns the output
//! [`MessageSequencePromise`] immediately — the producer itself hasn't
//! necessarily run a single step yet by the time `trigger` returns.

mod call;
mod interaction;

pub use call::AgentCall;
pub use interaction::InteractionContext;

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::Instrument;

use crate::context::Context;
use crate::error::CoreError;
use crate::flatten::{FlattenInput, FlatteningSequence};
use crate::message::{Message, MessageSequencePromise};

type BoxedProducer<C> =
    dyn Fn(InteractionContext, C) -> Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send>>
        + Send
        + Sync;

/// A named producer function plus a config value, invokable via
/// [`Agent::trigger`] (§4.G, GLOSSARY "Agent").
///
/// `Config` plays the role of the source's `**config` kwargs: a plain value
/// type the producer receives by value. [`Agent::fork`] rebinds it (partial
/// config in the source's terms), and an override passed to `trigger` is
/// applied on top of whatever `fork` already bound — "config overrides at
/// trigger time still win" (§4.G).
pub struct Agent<C> {
    name: Arc<str>,
    config: C,
    producer: Arc<BoxedProducer<C>>,
    shared: Option<Arc<dyn Any + Send + Sync>>,
}

impl<C> Clone for Agent<C>
where
    C: Clone,
{
    fn clone(&self) -> Self {
        Agent {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            producer: Arc::clone(&self.producer),
            shared: self.shared.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Agent<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<C> Agent<C>
where
    C: Clone + Default + Send + Sync + 'static,
{
    /// Wraps `producer` as a named agent with the default config. Mirrors
    /// decorating an async function `(ctx, **config)` (§4.G, §6).
    pub fn new<F, Fut>(name: impl Into<Arc<str>>, producer: F) -> Self
    where
        F: Fn(InteractionContext, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        Agent {
            name: name.into(),
            config: C::default(),
            producer: Arc::new(move |ctx, config| Box::pin(producer(ctx, config))),
            shared: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a new `Agent` wrapping the same producer, with `patch`
    /// applied to a clone of the current config. Overrides passed to
    /// `trigger`/`initiate_call` are applied on top of this, not instead of
    /// it (§4.G `fork`).
    pub fn fork(&self, patch: impl FnOnce(C) -> C) -> Self {
        Agent {
            name: Arc::clone(&self.name),
            config: patch(self.config.clone()),
            producer: Arc::clone(&self.producer),
            shared: self.shared.clone(),
        }
    }

    /// Binds shared, possibly-mutable state visible to every invocation of
    /// the forked agent via [`InteractionContext::shared`] — the source's
    /// `fork(non_freezable_kwargs=…)`. Single-task-tree-safe only; the core
    /// does not add synchronization beyond the `Arc` (§5, §9 open question).
    pub fn fork_with_shared<T: Send + Sync + 'static>(&self, state: Arc<T>) -> Self {
        Agent {
            shared: Some(state as Arc<dyn Any + Send + Sync>),
            ..self.fork(|c| c)
        }
    }

    /// Non-blocking: builds the input [`FlatteningSequence`] from `input`,
    /// schedules the producer under [`Context::current`], and returns the
    /// output sequence immediately. If no context is active, the returned
    /// sequence's first read raises [`CoreError::NoActiveContext`] rather
    /// than `trigger` itself returning a `Result` — the contract (§6
    /// "Trigger output: always a MessageSequencePromise") holds even in that
    /// failure case.
    pub fn trigger(&self, input: impl Into<FlattenInput>) -> MessageSequencePromise {
        self.trigger_with(input, |c| c)
    }

    /// Like [`Agent::trigger`], applying `overrides` to the config after any
    /// config bound by `fork`.
    pub fn trigger_with(
        &self,
        input: impl Into<FlattenInput>,
        overrides: impl FnOnce(C) -> C,
    ) -> MessageSequencePromise {
        match Context::current() {
            Ok(ctx) => self.trigger_in(&ctx, input, overrides),
            Err(err) => MessageSequencePromise::new(|appender| async move {
                appender.append_error(err);
                Ok(())
            }),
        }
    }

    /// Like [`Agent::trigger_with`], threading `ctx` explicitly instead of
    /// relying on ambient lookup (design note §9).
    pub fn trigger_in(
        &self,
        ctx: &Context,
        input: impl Into<FlattenInput>,
        overrides: impl FnOnce(C) -> C,
    ) -> MessageSequencePromise {
        let input_seq = FlatteningSequence::from_input(input.into(), ctx);
        let (output, output_appender) = FlatteningSequence::pending(ctx);
        self.spawn_invocation(ctx, input_seq, output_appender.clone(), overrides);
        output
    }

    /// Opens a pending invocation whose input is assembled incrementally via
    /// [`AgentCall::send_message`] rather than fully known up front (§4.G
    /// `initiate_call`). Uses [`Context::current`]; see [`Agent::initiate_call_in`]
    /// for the explicit-context form.
    pub fn initiate_call(&self, overrides: impl FnOnce(C) -> C) -> Result<AgentCall, CoreError> {
        let ctx = Context::current()?;
        Ok(self.initiate_call_in(&ctx, overrides))
    }

    pub fn initiate_call_in(&self, ctx: &Context, overrides: impl FnOnce(C) -> C) -> AgentCall {
        let (input_appender, input_seq) = call::pending_input(ctx);
        let (output, output_appender) = FlatteningSequence::pending(ctx);
        self.spawn_invocation(ctx, input_seq, output_appender.clone(), overrides);
        AgentCall::new(input_appender, output)
    }

    fn spawn_invocation(
        &self,
        ctx: &Context,
        input: MessageSequencePromise,
        output: crate::flatten::FlattenAppender,
        overrides: impl FnOnce(C) -> C,
    ) {
        let config = overrides(self.config.clone());
        let interaction = InteractionContext::new(ctx.clone(), input, output.clone(), self.shared.clone());
        let producer = Arc::clone(&self.producer);
        let errors_as_messages = ctx.flags().errors_as_messages;
        let name = Arc::clone(&self.name);
        let span = tracing::info_span!("agent_invocation", agent = %name);
        let cancel = ctx.cancellation_token();

        let spawned = ctx.spawn(
            async move {
                tracing::info!("producer started");
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(CoreError::StreamCancelled),
                    result = producer(interaction.clone(), config) => result,
                };
                match outcome {
                    Ok(()) => {
                        tracing::info!("producer terminated normally");
                        Ok(())
                    }
                    Err(CoreError::StreamCancelled) => {
                        tracing::info!("producer cancelled by context teardown");
                        interaction.fail_output(CoreError::StreamCancelled);
                        Err(CoreError::StreamCancelled)
                    }
                    Err(err) if errors_as_messages => {
                        tracing::info!(error = %err, "producer error converted to error message");
                        interaction.reply(Message::from_error(
                            "ProducerError",
                            err.to_string(),
                        ));
                        Ok(())
                    }
                    Err(err) => {
                        tracing::info!(error = %err, "producer terminated with error");
                        interaction.fail_output(err.clone());
                        Err(err)
                    }
                }
            }
            .instrument(span),
        );

        // `ctx` already finalizing: the caller still gets a well-formed
        // output sequence, just one that immediately observes ContextClosed
        // rather than silently hanging forever (§4.A "Triggering agents in
        // FINALIZING is an error").
        if spawned.is_err() {
            output.fail(CoreError::ContextClosed);
        }
    }
}
