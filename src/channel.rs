//! Message channel primitive.
//!
//! An ordered, one-directional queue of typed messages between the two
//! sides of a call. Each direction of a call owns exactly one channel.
//!
//! # Contract
//!
//! - `send` enqueues for the opposite side. The buffer is bounded: a
//!   producer that outruns the consumer blocks in `send` until space
//!   frees up. That is the engine's backpressure strategy.
//! - `close` is explicit and idempotent; sending after close fails with
//!   `ChannelClosed`. Dropping the sender closes implicitly.
//! - `recv` yields messages in exactly the order they were produced, then
//!   a close signal (`Ok(None)`) once the sender closed and the queue
//!   drained.
//! - Both `send` and `recv` watch the owning call's [`CallSignal`]: a
//!   blocked operation unblocks with `Aborted` as soon as the call
//!   terminates abnormally, and after an abort no further messages are
//!   delivered. Messages already received are never retracted.

use tokio::sync::mpsc;

use crate::call::CallSignal;
use crate::error::{CallwireError, Result};

/// Default per-direction buffer capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Create a channel for one direction of a call.
///
/// A capacity of zero is rounded up to one; a channel that can never hold
/// a message cannot make progress.
pub fn channel<T>(capacity: usize, signal: CallSignal) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Sender {
            tx: Some(tx),
            signal: signal.clone(),
        },
        Receiver { rx, signal },
    )
}

/// Producing end of a channel. Owned by exactly one side of the call.
#[derive(Debug)]
pub struct Sender<T> {
    tx: Option<mpsc::Sender<T>>,
    signal: CallSignal,
}

impl<T> Sender<T> {
    /// Enqueue a message, waiting for buffer space if necessary.
    ///
    /// # Errors
    ///
    /// `ChannelClosed` if this sender (or the receiving side) has closed;
    /// `Aborted` with the call's status if the call terminates abnormally
    /// before the message is accepted.
    pub async fn send(&self, message: T) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(CallwireError::ChannelClosed)?;
        tokio::select! {
            biased;
            status = self.signal.aborted() => Err(CallwireError::Aborted(status)),
            result = tx.send(message) => result.map_err(|_| CallwireError::ChannelClosed),
        }
    }

    /// Close this direction. Idempotent. The receiver drains whatever is
    /// queued, then observes the close signal.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Whether `close` has been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Clone of the underlying queue handle. The engine driver holds one
    /// across a call so the receiver cannot observe the channel as closed
    /// before the call's terminal status is published.
    pub(crate) fn raw(&self) -> Option<mpsc::Sender<T>> {
        self.tx.clone()
    }

    /// The call signal this channel is tied to.
    pub fn signal(&self) -> &CallSignal {
        &self.signal
    }
}

/// Consuming end of a channel. Owned by exactly one side of the call.
#[derive(Debug)]
pub struct Receiver<T> {
    rx: mpsc::Receiver<T>,
    signal: CallSignal,
}

impl<T> Receiver<T> {
    /// Receive the next message in FIFO order.
    ///
    /// Returns `Ok(None)` once the sending side has closed and the queue
    /// is drained, or `Aborted` with the call's status if the call
    /// terminates abnormally - even if messages remain queued.
    pub async fn recv(&mut self) -> Result<Option<T>> {
        tokio::select! {
            biased;
            status = self.signal.aborted() => Err(CallwireError::Aborted(status)),
            message = self.rx.recv() => Ok(message),
        }
    }

    /// The call signal this channel is tied to.
    pub fn signal(&self) -> &CallSignal {
        &self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{Call, CallShape};
    use crate::status::{Status, StatusKind};
    use std::time::Duration;

    fn test_channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>, std::sync::Arc<Call>) {
        let call = Call::new(CallShape::BidiStream, None);
        let (tx, rx) = channel(capacity, call.signal());
        (tx, rx, call)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx, _call) = test_channel(8);

        for i in 0..5i32 {
            tx.send(i).await.unwrap();
        }
        for i in 0..5i32 {
            assert_eq!(rx.recv().await.unwrap(), Some(i));
        }
    }

    #[tokio::test]
    async fn test_close_then_drain() {
        let (mut tx, mut rx, _call) = test_channel(8);

        tx.send("a").await.unwrap();
        tx.send("b").await.unwrap();
        tx.close();

        assert_eq!(rx.recv().await.unwrap(), Some("a"));
        assert_eq!(rx.recv().await.unwrap(), Some("b"));
        assert_eq!(rx.recv().await.unwrap(), None);
        // Close signal repeats.
        assert_eq!(rx.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut tx, _rx, _call) = test_channel(8);

        tx.close();
        assert!(tx.is_closed());
        let result = tx.send(1).await;
        assert!(matches!(result, Err(CallwireError::ChannelClosed)));

        // Closing again is fine.
        tx.close();
    }

    #[tokio::test]
    async fn test_drop_closes_implicitly() {
        let (tx, mut rx, _call) = test_channel(8);
        tx.send(7).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await.unwrap(), Some(7));
        assert_eq!(rx.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_abort_unblocks_pending_recv() {
        let (_tx, mut rx, call) = test_channel::<i32>(8);

        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        call.abort(Status::deadline_exceeded("too slow"));

        let result = waiter.await.unwrap();
        match result {
            Err(CallwireError::Aborted(status)) => {
                assert_eq!(status.kind(), StatusKind::DeadlineExceeded)
            }
            other => panic!("expected abort, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_abort_unblocks_blocked_send() {
        let (tx, _rx, call) = test_channel(1);
        tx.send(1).await.unwrap();

        // Buffer is full; the next send blocks until the abort.
        let sender = tokio::spawn(async move { tx.send(2).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        call.cancel();

        let result = sender.await.unwrap();
        match result {
            Err(CallwireError::Aborted(status)) => {
                assert_eq!(status.kind(), StatusKind::Cancelled)
            }
            other => panic!("expected abort, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_delivery_after_abort() {
        let (tx, mut rx, call) = test_channel(8);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Some(1));
        call.abort(Status::internal("fault"));

        // The second message is queued but never delivered.
        assert!(matches!(
            rx.recv().await,
            Err(CallwireError::Aborted(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_capacity_rounds_up() {
        let (tx, mut rx, _call) = test_channel(0);
        tx.send(42).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Some(42));
    }
}
