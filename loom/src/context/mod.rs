//! Runtime Context: the ambient scheduler and policy owner (§4.A).
//!
//! Exactly one `Context` is active per task tree. Agents and promises
//! created without one fail with [`CoreError::NoActiveContext`]. Ambient
//! lookup is a `tokio::task_local!`, not a global static guarded by a lock —
//! design note §9 permits threading the context explicitly instead, and
//! this crate does both: [`InteractionContext`](crate::agent::InteractionContext)
//! carries its own `Context` handle directly, and [`Context::current`] is a
//! convenience wrapper over the same task-local scope for code that would
//! rather not plumb it through every call.

pub mod flags;
pub mod persistence;

pub use flags::{ContextBuilder, ContextFlags};
pub use persistence::PersistenceHook;

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use std::sync::Mutex as SyncMutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::error::CoreError;
use crate::message::Message;
use persistence::PersistenceRegistry;

const CREATED: u8 = 0;
const ACTIVE: u8 = 1;
const FINALIZING: u8 = 2;
const FINALIZED: u8 = 3;

tokio::task_local! {
    static CURRENT: Context;
}

struct Inner {
    flags: ContextFlags,
    phase: AtomicU8,
    tasks: SyncMutex<JoinSet<Result<(), CoreError>>>,
    cancel: CancellationToken,
    persistence: PersistenceRegistry,
}

/// The ambient lifecycle object hosting the scheduler and policies for a
/// block of agent execution (`CREATED → ACTIVE → FINALIZING → FINALIZED`, §4.A).
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("flags", &self.inner.flags)
            .field("phase", &self.inner.phase.load(Ordering::SeqCst))
            .finish()
    }
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn new() -> Self {
        Context::builder().build()
    }

    pub(crate) fn from_flags(flags: ContextFlags) -> Self {
        Context {
            inner: Arc::new(Inner {
                flags,
                phase: AtomicU8::new(CREATED),
                tasks: SyncMutex::new(JoinSet::new()),
                cancel: CancellationToken::new(),
                persistence: PersistenceRegistry::new(),
            }),
        }
    }

    pub fn flags(&self) -> &ContextFlags {
        &self.inner.flags
    }

    /// Cancelled when [`Context::finalize`] begins; every background task
    /// spawned through [`Context::spawn`] should race this token the way
    /// [`crate::streamed_promise::StreamedPromise::with_cancellation`] does.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    fn activate(&self) -> Result<(), CoreError> {
        self.inner
            .phase
            .compare_exchange(CREATED, ACTIVE, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| CoreError::NestedContext)
    }

    /// Fully managed lifecycle (§6 form 1/2): activates, installs itself as
    /// the ambient context for `entry`, awaits it, then finalizes — waiting
    /// for every task registered via [`Context::spawn`] to complete.
    pub async fn run<F, Fut, T>(&self, entry: F) -> Result<T, CoreError>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = T>,
    {
        self.activate()?;
        let ctx = self.clone();
        let span = info_span!("context_run");
        let result = CURRENT
            .scope(ctx.clone(), async move { entry(ctx).await }.instrument(span))
            .await;
        self.finalize().await?;
        Ok(result)
    }

    /// Ambient lookup for code that was not handed a `Context` explicitly.
    /// Fails with [`CoreError::NoActiveContext`] outside [`Context::run`].
    pub fn current() -> Result<Context, CoreError> {
        CURRENT.try_with(|ctx| ctx.clone()).map_err(|_| CoreError::NoActiveContext)
    }

    /// True once finalization has begun (`FINALIZING` or `FINALIZED`) —
    /// triggering agents past this point is an error (§4.A).
    pub fn is_closed(&self) -> bool {
        matches!(self.inner.phase.load(Ordering::SeqCst), FINALIZING | FINALIZED)
    }

    /// Registers a background task under this context's scheduler. Errors
    /// with [`CoreError::ContextClosed`] once finalization has begun — new
    /// work cannot be scheduled during teardown (§4.A). Synchronous and
    /// non-suspending, so callers like `Agent::trigger` that must themselves
    /// stay non-blocking (§4.G) can call it directly.
    pub fn spawn<Fut>(&self, task: Fut) -> Result<(), CoreError>
    where
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        if self.is_closed() {
            return Err(CoreError::ContextClosed);
        }
        self.inner
            .tasks
            .lock()
            .expect("context task registry poisoned")
            .spawn(task);
        Ok(())
    }

    /// Waits for every task registered via [`Context::spawn`] to complete,
    /// cancelling them first via [`Context::cancellation_token`]. Returns
    /// the first error encountered, if any; every task still runs to
    /// completion or failure regardless (§4.A "always runs every registered
    /// task to completion or failure").
    pub async fn finalize(&self) -> Result<(), CoreError> {
        self.inner.phase.store(FINALIZING, Ordering::SeqCst);
        self.inner.cancel.cancel();

        let mut tasks = std::mem::take(
            &mut *self.inner.tasks.lock().expect("context task registry poisoned"),
        );
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(join_err) => Some(CoreError::from(join_err)),
            };
            if let Some(e) = outcome {
                tracing::info!(error = %e, "context task finished with error during finalize");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        self.inner.phase.store(FINALIZED, Ordering::SeqCst);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Registers a callback invoked once per unique message (by `hash_key`)
    /// as it becomes visible to any agent in this context (§4.A).
    pub fn register_persistence_hook(&self, hook: PersistenceHook) {
        self.inner.persistence.register(hook);
    }

    /// Called by the invocation machinery whenever a message becomes
    /// visible to an agent, sender or receiver side (§4.A).
    pub fn notify_persistence(&self, message: &Message) {
        self.inner.persistence.notify(message);
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}
