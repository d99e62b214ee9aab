//! Cancellation utilities
//!
//! Provides first-class cancellation handles for fragment streams, plus a drop
//! guard that turns "the consumer went away" into an explicit cancel.

use tokio_util::sync::CancellationToken;

use crate::provider::FragmentStream;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. Any wrapped streams observing this handle stop as
    /// soon as possible. Dropping the wrapped upstream stream closes its HTTP
    /// connection so the provider stops generating tokens.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

/// Make a fragment stream cancellable and return its cancel handle.
pub fn make_cancellable_stream(stream: FragmentStream) -> (FragmentStream, CancelHandle) {
    let handle = CancelHandle::new();
    (cancellable_with(stream, &handle), handle)
}

/// Wrap `stream` so that it ends as soon as `handle` is cancelled.
///
/// The inner stream is dropped when cancellation fires, not when the wrapper
/// is dropped, so upstream resources are released even if the wrapper is kept
/// alive by a slow consumer.
pub fn cancellable_with(stream: FragmentStream, handle: &CancelHandle) -> FragmentStream {
    let token = handle.token.clone();
    let mut inner = stream;
    let s = async_stream::stream! {
        use futures::StreamExt;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                item = inner.next() => {
                    let Some(item) = item else { break };
                    yield item;
                }
            }
        }
        drop(inner);
    };
    Box::pin(s)
}

/// Cancels its handle on drop unless disarmed first.
#[derive(Debug)]
pub struct CancelOnDrop {
    handle: Option<CancelHandle>,
}

impl CancelOnDrop {
    pub fn new(handle: CancelHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// The session reached a terminal state on its own; do not cancel.
    pub fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_cancelled() {
                tracing::debug!("consumer dropped the stream early; cancelling upstream");
            }
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn cancel_wakes_pending_next_immediately() {
        // A stream that never yields and never ends.
        let pending: FragmentStream = Box::pin(futures_util::stream::pending());
        let (mut s, cancel) = make_cancellable_stream(pending);

        let waiter = tokio::spawn(async move { s.next().await });

        // Give the task a chance to poll and block on `next()`.
        tokio::task::yield_now().await;

        cancel.cancel();

        let out = tokio::time::timeout(std::time::Duration::from_millis(200), waiter)
            .await
            .expect("cancel should wake the waiting task")
            .expect("task ok");

        assert!(out.is_none());
    }

    #[test]
    fn cancel_wakes_the_polling_task() {
        let pending: FragmentStream = Box::pin(futures_util::stream::pending());
        let (mut s, cancel) = make_cancellable_stream(pending);
        let mut next = tokio_test::task::spawn(s.next());
        tokio_test::assert_pending!(next.poll());

        cancel.cancel();
        assert!(next.is_woken());
        assert!(tokio_test::assert_ready!(next.poll()).is_none());
    }

    #[test]
    fn guard_cancels_unless_disarmed() {
        let fired = CancelHandle::new();
        drop(CancelOnDrop::new(fired.clone()));
        assert!(fired.is_cancelled());

        let kept = CancelHandle::new();
        let mut guard = CancelOnDrop::new(kept.clone());
        guard.disarm();
        drop(guard);
        assert!(!kept.is_cancelled());
    }
}
