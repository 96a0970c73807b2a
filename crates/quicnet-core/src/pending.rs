//! Pending operations
//!
//! Bridges engine callbacks to awaitable futures. The application thread
//! begins an operation and awaits the returned [`Completion`]; an engine
//! thread later resolves or cancels it. Resolution happens at most once and
//! never blocks the resolving thread.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{QuicError, Result};
use crate::sync::lock;

/// Slot for at most one in-progress operation
pub struct PendingOperation<T> {
    sender: Mutex<Option<oneshot::Sender<Result<T>>>>,
}

impl<T> PendingOperation<T> {
    pub fn new() -> Self {
        Self {
            sender: Mutex::new(None),
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.sender).is_some()
    }

    /// Start a new operation; `None` if one is already pending
    pub fn begin(&self) -> Option<Completion<T>> {
        let mut sender = lock(&self.sender);
        if sender.is_some() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        *sender = Some(tx);
        Some(Completion { receiver: rx })
    }

    /// Complete the pending operation; returns whether one was pending
    pub fn resolve(&self, value: T) -> bool {
        self.finish(Ok(value))
    }

    /// Cancel the pending operation; returns whether one was pending
    pub fn cancel(&self) -> bool {
        self.finish(Err(QuicError::Cancelled))
    }

    /// Fail the pending operation with a specific error
    pub fn fail(&self, error: QuicError) -> bool {
        self.finish(Err(error))
    }

    /// Forget the pending operation without completing it
    ///
    /// The awaiting side observes a cancellation.
    pub fn clear(&self) {
        lock(&self.sender).take();
    }

    fn finish(&self, outcome: Result<T>) -> bool {
        let sender = lock(&self.sender).take();
        match sender {
            Some(sender) => {
                // The awaiting side may have given up; that is not an error here
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }
}

impl<T> Default for PendingOperation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PendingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Future returned by `open` and `close`
#[derive(Debug)]
#[must_use = "completions do nothing unless awaited"]
pub struct Completion<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(QuicError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_resolve_once() {
        let pending = PendingOperation::new();
        let mut completion = task::spawn(pending.begin().unwrap());

        assert_pending!(completion.poll());
        assert!(pending.resolve(5u32));
        assert!(!pending.resolve(6u32));

        let outcome = assert_ready!(completion.poll());
        assert_eq!(outcome.unwrap(), 5);
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let pending = PendingOperation::<()>::new();
        let _first = pending.begin().unwrap();

        assert!(pending.begin().is_none());
        assert!(pending.is_pending());
    }

    #[test]
    fn test_cancel_and_clear_report_cancelled() {
        let pending = PendingOperation::<bool>::new();

        let mut cancelled = task::spawn(pending.begin().unwrap());
        assert!(pending.cancel());
        assert!(assert_ready!(cancelled.poll()).unwrap_err().is_cancelled());

        let mut cleared = task::spawn(pending.begin().unwrap());
        pending.clear();
        assert!(!pending.is_pending());
        assert!(assert_ready!(cleared.poll()).unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_resolve_from_another_thread() {
        let pending = std::sync::Arc::new(PendingOperation::new());
        let completion = pending.begin().unwrap();

        let resolver = std::sync::Arc::clone(&pending);
        std::thread::spawn(move || resolver.resolve("connected"))
            .join()
            .unwrap();

        assert_eq!(completion.await.unwrap(), "connected");
    }
}
