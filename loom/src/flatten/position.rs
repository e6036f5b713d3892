//! Per-position background resolution and the strict/as-ready emission
//! scheduler (§4.E "why flattening is the hard part").

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::CoreError;
use crate::message::MessagePromise;
use crate::sentinel::Sentinel;
use crate::streamed_promise::StreamAppender;

use super::input::FlattenInput;

/// Whether a declared position's pieces must wait for every earlier
/// position to finish emitting (`Strict`, the default for `reply`) or may
/// be emitted as soon as they're ready, interleaved with sibling `AsReady`
/// positions but still bracketed by the surrounding `Strict` ones
/// (`AsReady`, via `reply_out_of_order`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Strict,
    AsReady,
}

pub(super) enum Declaration {
    Position(FlattenInput, Order),
    Await,
    Clear,
    /// Forces the whole output sequence to terminate with `err` instead of
    /// closing normally — how a non-`errors_as_messages` agent invocation's
    /// uncaught producer error reaches consumers of its output (§4.G).
    Fail(CoreError),
}

/// External push side of a [`super::FlatteningSequence`]. Declaring a
/// position schedules its background resolution immediately — `push`
/// itself never blocks.
pub struct FlattenAppender {
    pub(super) sender: mpsc::UnboundedSender<Declaration>,
}

impl Clone for FlattenAppender {
    fn clone(&self) -> Self {
        FlattenAppender {
            sender: self.sender.clone(),
        }
    }
}

impl FlattenAppender {
    /// Declares a strict-order position (§4.E, the default for `reply`).
    pub fn push(&self, item: impl Into<FlattenInput>) {
        let _ = self.sender.send(Declaration::Position(item.into(), Order::Strict));
    }

    /// Declares an as-ready position (`reply_out_of_order`).
    pub fn push_out_of_order(&self, item: impl Into<FlattenInput>) {
        let _ = self
            .sender
            .send(Declaration::Position(item.into(), Order::AsReady));
    }

    /// Declares the `AWAIT` synchronization barrier (§4.E).
    pub fn await_barrier(&self) {
        let _ = self.sender.send(Declaration::Await);
    }

    /// Declares the `CLEAR` reset marker (§4.E).
    pub fn clear(&self) {
        let _ = self.sender.send(Declaration::Clear);
    }

    /// Forces the output sequence to terminate with `err` (§4.G error
    /// propagation, `errors_as_messages = false`).
    pub fn fail(&self, err: CoreError) {
        let _ = self.sender.send(Declaration::Fail(err));
    }

    /// Declares `item`, routing `Sentinel` values to [`FlattenAppender::await_barrier`]
    /// / [`FlattenAppender::clear`] instead of treating them as ordinary
    /// positions.
    pub fn push_item(&self, item: FlattenInput, order: Order) {
        match item {
            FlattenInput::Sentinel(Sentinel::Await) => self.await_barrier(),
            FlattenInput::Sentinel(Sentinel::Clear) => self.clear(),
            other => match order {
                Order::Strict => self.push(other),
                Order::AsReady => self.push_out_of_order(other),
            },
        }
    }
}

type PositionHandle = JoinHandle<Result<Vec<MessagePromise>, CoreError>>;

/// Recursively resolves a single declared position into the (possibly
/// empty, possibly multi-element) run of `MessagePromise`s it contributes,
/// flattening nested sequences and promises depth-first, left-to-right
/// (§8 property 5). Spawned via `tokio::spawn` the moment a position is
/// declared, so sibling positions' resolutions genuinely run concurrently
/// underneath strict emission ordering (§8 scenario 2).
pub(super) fn spawn_position(input: FlattenInput) -> PositionHandle {
    tokio::spawn(resolve(input))
}

fn resolve(input: FlattenInput) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<MessagePromise>, CoreError>> + Send>> {
    Box::pin(async move {
        match input {
            FlattenInput::Message(message) => Ok(vec![MessagePromise::ready(message)]),
            FlattenInput::Text(text) => Ok(vec![MessagePromise::ready(crate::message::Message::text(text))]),
            FlattenInput::MessagePromise(promise) => Ok(vec![promise]),
            FlattenInput::Sequence(sequence) => {
                let mut pieces = Vec::new();
                let mut iter = sequence.iter();
                while let Some(piece) = iter.next().await {
                    pieces.push(piece?);
                }
                Ok(pieces)
            }
            FlattenInput::Many(items) => {
                let mut handles = Vec::new();
                for item in items {
                    if matches!(item, FlattenInput::Sentinel(_)) {
                        continue;
                    }
                    handles.push(spawn_position(item));
                }
                let mut pieces = Vec::new();
                for handle in handles {
                    pieces.extend(handle.await.map_err(CoreError::from)??);
                }
                Ok(pieces)
            }
            FlattenInput::Deferred(promise) => {
                let resolved = promise.get().await?;
                resolve(resolved).await
            }
            FlattenInput::Sentinel(_) => Ok(Vec::new()),
        }
    })
}

/// Drains declared positions from `receiver`, grouping them at `AWAIT`
/// barriers. Strict positions flush to `appender` as soon as each one
/// resolves, in declaration order, rather than waiting for their whole
/// group — a producer that replies and then keeps running (or keeps
/// waiting on more input) must not stall its own output (§4.C, §4.E(iii)).
/// As-ready positions still wait for an `AWAIT`, `CLEAR`, or channel close
/// so they can race against the rest of their run; a leading strict
/// position never blocks on a trailing as-ready sibling still pending.
pub(super) async fn drive(
    mut receiver: mpsc::UnboundedReceiver<Declaration>,
    appender: StreamAppender<MessagePromise>,
) -> Result<(), CoreError> {
    let mut group: Vec<(Order, PositionHandle)> = Vec::new();
    loop {
        let declaration = match receiver.try_recv() {
            Ok(declaration) => Some(declaration),
            Err(mpsc::error::TryRecvError::Empty) => {
                let leading = take_leading_strict(&mut group);
                if !leading.is_empty() {
                    flush_group(leading, &appender).await?;
                    continue;
                }
                receiver.recv().await
            }
            Err(mpsc::error::TryRecvError::Disconnected) => None,
        };
        match declaration {
            None => break,
            Some(Declaration::Position(input, order)) => {
                group.push((order, spawn_position(input)));
            }
            Some(Declaration::Await) => {
                let pending = std::mem::take(&mut group);
                flush_group(pending, &appender).await?;
            }
            Some(Declaration::Clear) => {
                for (_, handle) in group.drain(..) {
                    handle.abort();
                }
            }
            Some(Declaration::Fail(err)) => {
                for (_, handle) in group.drain(..) {
                    handle.abort();
                }
                return Err(err);
            }
        }
    }
    flush_group(group, &appender).await?;
    appender.close();
    Ok(())
}

/// Pulls the leading run of already-resolvable `Strict` positions off the
/// front of `group`, stopping at the first `AsReady` entry so a racing run
/// isn't split up mid-flight.
fn take_leading_strict(group: &mut Vec<(Order, PositionHandle)>) -> Vec<(Order, PositionHandle)> {
    let split_at = group
        .iter()
        .take_while(|(order, _)| *order == Order::Strict)
        .count();
    group.drain(..split_at).collect()
}

async fn flush_group(
    declared: Vec<(Order, PositionHandle)>,
    appender: &StreamAppender<MessagePromise>,
) -> Result<(), CoreError> {
    let mut iter = declared.into_iter().peekable();
    while let Some((order, handle)) = iter.next() {
        match order {
            Order::Strict => {
                let pieces = handle.await.map_err(CoreError::from)??;
                for piece in pieces {
                    appender.append(piece);
                }
            }
            Order::AsReady => {
                let mut run: FuturesUnordered<_> = FuturesUnordered::new();
                run.push(handle);
                while matches!(iter.peek(), Some((Order::AsReady, _))) {
                    let (_, next) = iter.next().expect("peeked Some");
                    run.push(next);
                }
                while let Some(joined) = run.next().await {
                    let pieces = joined.map_err(CoreError::from)??;
                    for piece in pieces {
                        appender.append(piece);
                    }
                }
            }
        }
    }
    Ok(())
}
