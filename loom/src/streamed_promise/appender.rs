//! External push-side handle for a [`super::StreamedPromise`] (§4.D).

use std::sync::Arc;

use super::log::Log;

/// Handle passed to a [`super::StreamedPromise`]'s producer. Holds a
/// back-reference to the log for the sole purpose of pushing pieces — it
/// does not own the `StreamedPromise` (§3 ownership note).
pub struct StreamAppender<T> {
    pub(crate) log: Arc<Log<T>>,
}

impl<T> Clone for StreamAppender<T> {
    fn clone(&self) -> Self {
        StreamAppender {
            log: Arc::clone(&self.log),
        }
    }
}

impl<T: Clone> StreamAppender<T> {
    /// Schedules `piece` for delivery. Returns immediately; never blocks.
    /// A no-op once the stream has been closed or failed.
    pub fn append(&self, piece: T) {
        self.log.append(piece);
    }

    /// Terminal error append. Further appends after this are ignored.
    pub fn append_error(&self, err: crate::error::CoreError) {
        self.log.fail(err);
    }

    /// Terminal normal close. Further appends after this are ignored.
    pub fn close(&self) {
        self.log.close();
    }
}
