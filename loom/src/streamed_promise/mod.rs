//! Lazily-produced, replayable sequence of pieces (§4.C).
//!
//! A `StreamedPromise<T>` runs its producer at most once, across any number
//! of independent iterators, each of which replays the full piece sequence
//! from the beginning — including iterators obtained after the producer has
//! already finished. This is what lets an agent fan an output out to a
//! logger, a downstream agent, and the user without an explicit tee (§4.C
//! "Replayability rationale").

mod appender;
mod log;

pub use appender::StreamAppender;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::promise::Promise;
use log::Log;

/// A producer-driven, replayable, memoized stream of pieces.
pub struct StreamedPromise<T> {
    log: Arc<Log<T>>,
    /// Resolves once the producer has run to completion (normally, by error,
    /// or by cancellation) and the terminal marker has been appended to
    /// `log`. Reused as the "run at most once" latch (§4.C).
    driver: Promise<()>,
}

impl<T> Clone for StreamedPromise<T> {
    fn clone(&self) -> Self {
        StreamedPromise {
            log: Arc::clone(&self.log),
            driver: self.driver.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StreamedPromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedPromise").finish_non_exhaustive()
    }
}

impl<T> StreamedPromise<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Builds a streamed promise from a producer function. The producer is
    /// not run until [`StreamedPromise::iter`]/[`StreamedPromise::collect`]
    /// is called, or [`StreamedPromise::start`] schedules it eagerly.
    ///
    /// The producer itself must cause exactly one terminal event on the
    /// appender on normal exit; if it returns `Ok(())` without closing, the
    /// runtime closes automatically; if it returns `Err`, the runtime
    /// appends the error. Panics and a cancelled owning context are also
    /// captured as terminal events — the wrapper here is the one place that
    /// does the broad catch the design notes call for (§4.D, §9).
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(StreamAppender<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        Self::with_cancellation(producer, CancellationToken::new())
    }

    /// Like [`StreamedPromise::new`], but the producer is cancelled (and the
    /// stream observes `StreamCancelled`) when `cancel` fires — this is how
    /// [`crate::context::Context`] finalization reaches every live producer.
    pub fn with_cancellation<F, Fut>(producer: F, cancel: CancellationToken) -> Self
    where
        F: FnOnce(StreamAppender<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        let log = Arc::new(Log::new());
        let driver_log = Arc::clone(&log);

        let driver = Promise::new(async move {
            let appender = StreamAppender {
                log: Arc::clone(&driver_log),
            };
            let inner = tokio::spawn(async move {
                std::panic::AssertUnwindSafe(producer(appender))
                    .catch_unwind()
                    .await
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    driver_log.fail(CoreError::StreamCancelled);
                    inner.abort();
                }
                joined = inner => {
                    match joined {
                        Ok(Ok(Ok(()))) => driver_log.close(),
                        Ok(Ok(Err(e))) => driver_log.fail(e),
                        Ok(Err(panic)) => {
                            driver_log.fail(CoreError::ProducerError(describe_panic(panic)));
                        }
                        Err(join_err) => driver_log.fail(CoreError::from(join_err)),
                    }
                }
            }
            Ok::<_, CoreError>(())
        });

        StreamedPromise { log, driver }
    }

    /// An already-empty, already-closed stream. Useful as a default / for
    /// boundary-behavior tests ("a producer that appends nothing and closes
    /// yields an empty, awaitable output", §8).
    pub fn empty() -> Self {
        StreamedPromise::new(|appender: StreamAppender<T>| async move {
            appender.close();
            Ok(())
        })
    }

    /// Eagerly schedules the producer without waiting for an iterator or
    /// `collect` call ("start soon" scheduling, §4.A/§4.G).
    pub fn start(&self) {
        self.driver.start();
    }

    /// Returns a fresh iterator. Every iterator — including ones created
    /// after the producer has finished — observes the full piece sequence
    /// from the beginning (§4.C replayability).
    pub fn iter(&self) -> StreamIter<T> {
        self.start();
        StreamIter {
            log: Arc::clone(&self.log),
            index: 0,
        }
    }

    /// Awaits the producer to completion and returns every piece produced.
    /// Re-raises the producer's terminal error, if any.
    pub async fn collect(&self) -> Result<Vec<T>, CoreError> {
        self.driver.get().await?;
        match self.log.terminal() {
            Some(Err(e)) => Err(e),
            _ => Ok(self.log.all_pieces()),
        }
    }
}

fn describe_panic(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "producer panicked".to_string()
    }
}

/// A fresh, independent read cursor over a [`StreamedPromise`]'s pieces.
pub struct StreamIter<T> {
    log: Arc<Log<T>>,
    index: usize,
}

impl<T> StreamIter<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Returns the next piece, awaiting production if necessary; `None`
    /// means the stream closed normally at this position.
    pub async fn next(&mut self) -> Option<Result<T, CoreError>> {
        let result = self.log.get(self.index).await;
        if matches!(result, Some(Ok(_))) {
            self.index += 1;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_producer(
        counter: Arc<AtomicUsize>,
        items: Vec<&'static str>,
    ) -> impl FnOnce(StreamAppender<&'static str>) -> futures::future::BoxFuture<'static, Result<(), CoreError>>
    {
        move |appender| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                for item in items {
                    appender.append(item);
                }
                appender.close();
                Ok(())
            })
        }
    }

    /// **Scenario 3 — Replay**: two independent iterators see the same
    /// pieces in the same order and the producer runs exactly once.
    #[tokio::test]
    async fn replay_yields_same_pieces_producer_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let sp = StreamedPromise::new(counting_producer(Arc::clone(&counter), vec!["a", "b", "c"]));

        let mut first = Vec::new();
        let mut it1 = sp.iter();
        while let Some(Ok(piece)) = it1.next().await {
            first.push(piece);
        }

        let mut second = Vec::new();
        let mut it2 = sp.iter();
        while let Some(Ok(piece)) = it2.next().await {
            second.push(piece);
        }

        assert_eq!(first, vec!["a", "b", "c"]);
        assert_eq!(second, first);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// **Scenario**: `collect` triggers the producer even with no iterator.
    #[tokio::test]
    async fn collect_triggers_producer_to_completion() {
        let counter = Arc::new(AtomicUsize::new(0));
        let sp = StreamedPromise::new(counting_producer(Arc::clone(&counter), vec!["x"]));
        let pieces = sp.collect().await.unwrap();
        assert_eq!(pieces, vec!["x"]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// **Boundary**: empty producer yields empty, awaitable output.
    #[tokio::test]
    async fn empty_producer_yields_empty_output() {
        let sp: StreamedPromise<i32> = StreamedPromise::empty();
        assert_eq!(sp.collect().await.unwrap(), Vec::<i32>::new());
    }

    /// **Boundary**: a producer that raises before appending anything makes
    /// the first iterator read raise that error.
    #[tokio::test]
    async fn producer_error_before_any_piece_raises_on_first_read() {
        let sp: StreamedPromise<i32> = StreamedPromise::new(|_appender| async move {
            Err(CoreError::ProducerError("boom".into()))
        });
        let mut it = sp.iter();
        let first = it.next().await;
        assert!(matches!(first, Some(Err(CoreError::ProducerError(_)))));
    }

    /// **Scenario**: a producer that forgets to close is closed automatically
    /// by the runtime.
    #[tokio::test]
    async fn producer_returning_ok_without_closing_is_auto_closed() {
        let sp: StreamedPromise<i32> = StreamedPromise::new(|appender| async move {
            appender.append(1);
            Ok(())
        });
        assert_eq!(sp.collect().await.unwrap(), vec![1]);
    }

    /// **Scenario**: a panicking producer is captured, not propagated as an
    /// uncaught panic — "the wrapper MUST capture every exception" (§4.D).
    #[tokio::test]
    async fn panicking_producer_becomes_terminal_error() {
        let sp: StreamedPromise<i32> = StreamedPromise::new(|appender| async move {
            appender.append(1);
            panic!("producer exploded");
        });
        let err = sp.collect().await.unwrap_err();
        assert!(matches!(err, CoreError::ProducerError(_)));
    }

    /// **Scenario**: cancelling the owning context is observed by a live
    /// iterator as `StreamCancelled`.
    #[tokio::test]
    async fn cancellation_surfaces_as_stream_cancelled() {
        let token = CancellationToken::new();
        let sp: StreamedPromise<i32> = StreamedPromise::with_cancellation(
            |_appender| async move {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(())
            },
            token.clone(),
        );
        let mut it = sp.iter();
        tokio::task::yield_now().await;
        token.cancel();
        let first = it.next().await;
        assert!(matches!(first, Some(Err(CoreError::StreamCancelled))));
    }

    /// **Scenario**: a slow iterator never blocks the producer — pieces are
    /// buffered, multiple iterators may sit at different positions.
    #[tokio::test]
    async fn slow_iterator_does_not_block_producer() {
        let sp: StreamedPromise<i32> = StreamedPromise::new(|appender| async move {
            for i in 0..5 {
                appender.append(i);
            }
            appender.close();
            Ok(())
        });
        sp.collect().await.unwrap();

        let mut fast = sp.iter();
        assert_eq!(fast.next().await, Some(Ok(0)));
        assert_eq!(fast.next().await, Some(Ok(1)));

        let mut slow = sp.iter();
        assert_eq!(slow.next().await, Some(Ok(0)));

        assert_eq!(fast.next().await, Some(Ok(2)));
    }
}
