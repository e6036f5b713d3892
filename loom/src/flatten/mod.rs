//! Hierarchical message-sequence flattening (§4.E).
//!
//! A [`FlatteningSequence`] accepts the heterogeneous, possibly nested item
//! shapes collected in [`FlattenInput`], declared incrementally through a
//! [`FlattenAppender`], and drives them into a single flat
//! [`crate::message::MessageSequencePromise`] — Strict positions emitted in
//! declaration order, AsReady positions raced against their immediate
//! neighbors, `AWAIT` and `CLEAR` acting as the position stream's own
//! synchronization and reset markers rather than ordinary content.

mod input;
mod position;

pub use input::FlattenInput;
pub use position::{FlattenAppender, Order};

use tokio::sync::mpsc;

use crate::context::Context;
use crate::message::MessageSequencePromise;

/// Namespace for building flattened message sequences (§4.E).
pub struct FlatteningSequence;

impl FlatteningSequence {
    /// Opens a fresh position stream: positions declared on the returned
    /// [`FlattenAppender`] are flattened, in order (modulo `AsReady` racing),
    /// into the returned [`MessageSequencePromise`]. The underlying stream is
    /// cancelled the moment `ctx` begins finalizing, the same as any other
    /// agent output (§4.A).
    pub fn pending(ctx: &Context) -> (MessageSequencePromise, FlattenAppender) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = ctx.cancellation_token();
        let sequence = MessageSequencePromise::with_cancellation(
            move |appender| async move { position::drive(receiver, appender).await },
            cancel,
        );
        (sequence, FlattenAppender { sender })
    }

    /// Convenience form for a single, already-fully-known input shape: opens
    /// a position stream, declares `input` as its sole strict position, and
    /// closes immediately — no `AWAIT`/`CLEAR` involved.
    pub fn from_input(input: FlattenInput, ctx: &Context) -> MessageSequencePromise {
        let (sequence, appender) = FlatteningSequence::pending(ctx);
        appender.push(input);
        drop(appender);
        sequence
    }
}
