//! The handle a running agent producer uses to read its input and write its
//! output (§4.G "InteractionContext").

use std::any::Any;
use std::sync::Arc;

use crate::context::Context;
use crate::error::CoreError;
use crate::flatten::{FlattenAppender, FlattenInput, Order};
use crate::message::{Message, MessagePromise, MessageSequencePromise};
use crate::promise::Promise;

/// Passed by value to an agent's producer function. Bundles the owning
/// [`Context`] (taken explicitly, per design note §9, rather than relying
/// solely on ambient lookup), the flattened input sequence, the output
/// position stream, and whatever `fork_with_shared` state the invoking
/// [`super::Agent`] carries.
#[derive(Clone)]
pub struct InteractionContext {
    ctx: Context,
    input: MessageSequencePromise,
    output: FlattenAppender,
    shared: Option<Arc<dyn Any + Send + Sync>>,
}

impl InteractionContext {
    pub(super) fn new(
        ctx: Context,
        input: MessageSequencePromise,
        output: FlattenAppender,
        shared: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        InteractionContext {
            ctx,
            input,
            output,
            shared,
        }
    }

    /// The [`Context`] this invocation is running under.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The flattened input sequence, e.g. for `for p in ctx.input().iter() { ... }`.
    pub fn input(&self) -> &MessageSequencePromise {
        &self.input
    }

    /// State attached to the invoking agent via `fork_with_shared`, if any
    /// and if it downcasts to `T` (§9 "single-task-tree-safe only").
    pub fn shared<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.shared.clone()?.downcast::<T>().ok()
    }

    /// Appends `item` to the output in strict order (§4.G `reply`). Never
    /// suspends.
    pub fn reply(&self, item: impl Into<FlattenInput>) {
        let item = item.into();
        self.notify_if_message(&item);
        self.output.push_item(item, Order::Strict);
    }

    /// Appends `item` as-ready relative to other `reply_out_of_order`
    /// positions, still bracketed by surrounding `reply` positions (§4.G).
    pub fn reply_out_of_order(&self, item: impl Into<FlattenInput>) {
        let item = item.into();
        self.notify_if_message(&item);
        self.output.push_item(item, Order::AsReady);
    }

    fn notify_if_message(&self, item: &FlattenInput) {
        if let FlattenInput::Message(message) = item {
            self.notify_persistence(message);
        }
    }

    /// Declares the `AWAIT` barrier on the output position stream (§4.E).
    pub fn reply_await(&self) {
        self.output.await_barrier();
    }

    /// Declares the `CLEAR` reset marker on the output position stream (§4.E).
    pub fn reply_clear(&self) {
        self.output.clear();
    }

    /// Convenience for an agent whose entire output is one streamed text
    /// message: replies with a single [`MessagePromise`] built from `produce`.
    pub fn reply_text_stream<F, Fut>(&self, role: Option<crate::message::Role>, produce: F)
    where
        F: FnOnce(crate::message::promise::TokenAppender) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        let promise = MessagePromise::text_stream(role, Default::default(), produce);
        self.reply(promise);
    }

    pub(super) fn fail_output(&self, err: CoreError) {
        self.output.fail(err);
    }

    pub(super) fn notify_persistence(&self, message: &Message) {
        self.ctx.notify_persistence(message);
    }

    /// A promise resolving to the concatenation of every resolved input
    /// message's payload, as a convenience for text-only agents.
    pub fn input_as_single_text_promise(&self) -> Promise<String> {
        self.input.as_single_text_promise()
    }
}
