//! Append-only piece log with a per-iterator cursor (§9 design note).
//!
//! Plain `std::sync::Mutex` guards the small, synchronous critical section
//! (push a piece / read the current length); a `tokio::sync::Notify` plays
//! the role of the condition variable woken on every append and on the
//! terminal event. Using a blocking mutex here (instead of `tokio::sync::Mutex`)
//! is what makes `StreamAppender::append` genuinely non-suspending, as the
//! contract in §4.D requires.

use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::CoreError;

struct LogState<T> {
    pieces: Vec<T>,
    terminal: Option<Result<(), CoreError>>,
}

pub(crate) struct Log<T> {
    state: Mutex<LogState<T>>,
    notify: Notify,
}

impl<T> Log<T> {
    pub(crate) fn new() -> Self {
        Log {
            state: Mutex::new(LogState {
                pieces: Vec::new(),
                terminal: None,
            }),
            notify: Notify::new(),
        }
    }
}

impl<T: Clone> Log<T> {
    /// Appends a piece unless the log is already terminal — further appends
    /// after close/error are silently ignored (§4.D).
    pub(crate) fn append(&self, piece: T) {
        let mut state = self.state.lock().expect("log mutex poisoned");
        if state.terminal.is_some() {
            return;
        }
        state.pieces.push(piece);
        drop(state);
        self.notify.notify_waiters();
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock().expect("log mutex poisoned");
        if state.terminal.is_none() {
            state.terminal = Some(Ok(()));
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub(crate) fn fail(&self, err: CoreError) {
        let mut state = self.state.lock().expect("log mutex poisoned");
        if state.terminal.is_none() {
            state.terminal = Some(Err(err));
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Returns the piece at `index` if present, the terminal result if
    /// `index` is past the end, or `None` if neither is available yet (the
    /// caller should wait on `notified()` and retry).
    fn peek(&self, index: usize) -> Peek<T> {
        let state = self.state.lock().expect("log mutex poisoned");
        if index < state.pieces.len() {
            return Peek::Item(state.pieces[index].clone());
        }
        match &state.terminal {
            Some(Ok(())) => Peek::Closed,
            Some(Err(e)) => Peek::Failed(e.clone()),
            None => Peek::Pending,
        }
    }

    pub(crate) async fn get(&self, index: usize) -> Option<Result<T, CoreError>> {
        loop {
            match self.peek(index) {
                Peek::Item(item) => return Some(Ok(item)),
                Peek::Closed => return None,
                Peek::Failed(e) => return Some(Err(e)),
                Peek::Pending => {
                    let notified = self.notify.notified();
                    // Re-check under the same race-avoidance as Promise::get:
                    // an append/close/fail between the read above and arming
                    // `notified()` is still observed because `Notify` buffers
                    // one wakeup, but we also short-circuit here so we never
                    // await when data already landed.
                    if !matches!(self.peek(index), Peek::Pending) {
                        continue;
                    }
                    notified.await;
                }
            }
        }
    }

    /// Snapshot of all pieces and the terminal result, once terminal.
    /// Blocks (synchronously, on the std mutex only) until terminal.
    pub(crate) fn all_pieces(&self) -> Vec<T> {
        self.state.lock().expect("log mutex poisoned").pieces.clone()
    }

    pub(crate) fn terminal(&self) -> Option<Result<(), CoreError>> {
        self.state.lock().expect("log mutex poisoned").terminal.clone()
    }
}

enum Peek<T> {
    Item(T),
    Closed,
    Failed(CoreError),
    Pending,
}
