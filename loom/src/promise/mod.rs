//! Single-shot, memoized promise (§4.B).
//!
//! A `Promise<T>` wraps a boxed future that is driven to completion at most
//! once; every concurrent and subsequent awaiter observes the same
//! `Result<T, CoreError>`. Resolution may start on first [`Promise::get`]
//! (lazy) or be kicked off immediately via [`Promise::start`] (eager,
//! "start soon" — see [`crate::context::Context`]'s `start_soon_default`).
//!
//! Built on `tokio::sync::Mutex` + `Notify` rather than a custom primitive,
//! matching the teacher's existing reach for `tokio::sync` types
//! (`model_spec::local_file`'s `RwLock`, `llm`'s `mpsc`) instead of hand-rolled
//! synchronization.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::error::CoreError;

type BoxedResolver<T> = Pin<Box<dyn Future<Output = Result<T, CoreError>> + Send>>;

enum State<T> {
    /// Not yet driven. `None` means the value will arrive via an external
    /// [`PromiseSetter`] rather than by polling a resolver future.
    Idle(Option<BoxedResolver<T>>),
    /// Another task is currently driving the resolver (or we are waiting
    /// for an external setter); `get` callers block on the `Notify`.
    Running,
    Resolved(Result<T, CoreError>),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

/// A single-value future with memoized resolution and exception capture.
///
/// Cloning a `Promise` shares the same underlying state — all clones observe
/// the same resolution, matching "concurrent awaiters share the same
/// outcome" (§4.B).
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Builds a promise from a resolver future. The future is not polled
    /// until [`Promise::get`] is called or [`Promise::start`] schedules it.
    pub fn new<Fut>(resolver: Fut) -> Self
    where
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        Promise {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Idle(Some(Box::pin(resolver)))),
                notify: Notify::new(),
            }),
        }
    }

    /// A promise that is already resolved to `value`.
    pub fn resolved(value: T) -> Self {
        Promise {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Resolved(Ok(value))),
                notify: Notify::new(),
            }),
        }
    }

    /// A promise that is already resolved to an error.
    pub fn failed(err: CoreError) -> Self {
        Promise {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Resolved(Err(err))),
                notify: Notify::new(),
            }),
        }
    }

    /// Creates an unresolved placeholder promise (the `NO_VALUE` case from
    /// §4.B) paired with a [`PromiseSetter`] that resolves it externally.
    pub fn pending() -> (Self, PromiseSetter<T>) {
        let promise = Promise {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Idle(None)),
                notify: Notify::new(),
            }),
        };
        let setter = PromiseSetter {
            inner: Arc::clone(&promise.inner),
        };
        (promise, setter)
    }

    /// Awaits resolution, returning the memoized value or re-raising the
    /// memoized error. Drives the resolver on first call if nothing else
    /// has started it yet (lazy default).
    pub async fn get(&self) -> Result<T, CoreError> {
        loop {
            let fut_to_drive = {
                let mut state = self.inner.state.lock().await;
                match &mut *state {
                    State::Resolved(result) => return result.clone(),
                    State::Running => None,
                    State::Idle(resolver_slot) => match resolver_slot.take() {
                        Some(fut) => {
                            *state = State::Running;
                            Some(fut)
                        }
                        // externally-resolved placeholder, nothing to drive:
                        // leave state as Idle(None) and fall through to wait.
                        None => None,
                    },
                }
            };

            match fut_to_drive {
                Some(fut) => {
                    let result = fut.await;
                    let mut state = self.inner.state.lock().await;
                    *state = State::Resolved(result.clone());
                    drop(state);
                    self.inner.notify.notify_waiters();
                    return result;
                }
                None => {
                    // Either another task is driving the resolver, or this
                    // is a pending external placeholder: wait to be woken
                    // and re-check.
                    let notified = self.inner.notify.notified();
                    // Re-check state under a narrow window to avoid missing
                    // a notification fired between the unlock above and
                    // `notified()` being armed: `Notify` buffers one permit,
                    // so a resolve that happens after we read `Idle`/`Running`
                    // but before we call `.notified()` is still observed,
                    // this sleep is only to yield if already resolved.
                    if let State::Resolved(result) = &*self.inner.state.lock().await {
                        return result.clone();
                    }
                    notified.await;
                }
            }
        }
    }

    /// Eagerly schedules resolution on a background task via `tokio::spawn`,
    /// returning immediately. Errors from the resolver stay memoized on this
    /// promise; they surface to whoever calls [`Promise::get`]. Used by
    /// context-aware constructors under `start_soon_default` — see
    /// [`crate::context::Context`].
    pub fn start(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            let _ = this.get().await;
        });
    }

    /// True once the promise has a memoized result (resolved or failed).
    pub async fn is_settled(&self) -> bool {
        matches!(&*self.inner.state.lock().await, State::Resolved(_))
    }
}

/// External push-side handle for a [`Promise`] created via [`Promise::pending`].
pub struct PromiseSetter<T> {
    inner: Arc<Inner<T>>,
}

impl<T> PromiseSetter<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Resolves the paired promise to `value`. Returns
    /// `CoreError::InvariantViolation` if the promise was already resolved —
    /// a `Promise` resolves at most once.
    pub async fn resolve(self, value: T) -> Result<(), CoreError> {
        self.settle(Ok(value)).await
    }

    /// Resolves the paired promise to an error.
    pub async fn fail(self, err: CoreError) -> Result<(), CoreError> {
        self.settle(Err(err)).await
    }

    async fn settle(self, result: Result<T, CoreError>) -> Result<(), CoreError> {
        let mut state = self.inner.state.lock().await;
        match &*state {
            State::Resolved(_) => Err(CoreError::InvariantViolation(
                "promise already resolved".to_string(),
            )),
            _ => {
                *state = State::Resolved(result);
                drop(state);
                self.inner.notify.notify_waiters();
                Ok(())
            }
        }
    }
}
