//! Incrementally-assembled agent invocations (§4.G `initiate_call`).

use crate::context::Context;
use crate::flatten::{FlattenAppender, FlattenInput};
use crate::message::MessageSequencePromise;

/// A pending invocation whose input is still open. Useful when the input
/// depends on other running computations rather than being fully known at
/// trigger time (§4.G).
pub struct AgentCall {
    input_appender: FlattenAppender,
    output: MessageSequencePromise,
}

impl AgentCall {
    pub(super) fn new(input_appender: FlattenAppender, output: MessageSequencePromise) -> Self {
        AgentCall {
            input_appender,
            output,
        }
    }

    /// Pushes `item` onto the open input sequence (§4.G `send_message`).
    /// Never suspends; the default unbounded input queue never applies
    /// backpressure (§5).
    pub fn send_message(&self, item: impl Into<FlattenInput>) {
        self.input_appender.push(item);
    }

    /// Like [`AgentCall::send_message`], but the pushed item is emitted
    /// as-ready relative to other out-of-order positions in the input.
    pub fn send_message_out_of_order(&self, item: impl Into<FlattenInput>) {
        self.input_appender.push_out_of_order(item);
    }

    /// Closes the input (no further `send_message` calls are observed) and
    /// returns the output sequence. Idempotent: the input closes once the
    /// last clone of this call's appender is dropped, which `reply_sequence`
    /// forces immediately by consuming `self`.
    pub fn reply_sequence(self) -> MessageSequencePromise {
        drop(self.input_appender);
        self.output
    }
}

/// Constructs a fresh open-input position stream: the caller feeds it via
/// `send_message`/`AgentCall`, and the agent's producer reads the returned
/// sequence as its input.
pub(super) fn pending_input(ctx: &Context) -> (FlattenAppender, MessageSequencePromise) {
    let (sequence, appender) = crate::flatten::FlatteningSequence::pending(ctx);
    (appender, sequence)
}
