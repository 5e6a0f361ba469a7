//! Shared termination signal.
//!
//! Every blocking point in a call - a send against a full buffer, a
//! receive on an empty one, the wait for a unary response, the wait for a
//! concurrency permit - selects on this signal alongside its own future.
//! That is the cooperative-cancellation contract: there is one "done"
//! signal per call, observed at every suspension point, rather than
//! scattered flag checks, so cancellation latency is bounded by one unit
//! of work.

use tokio::sync::watch;

use super::{CallState, Lifecycle};
use crate::status::Status;

/// Subscription to one call's lifecycle transitions.
///
/// Cheaply cloneable; all clones observe the same call.
#[derive(Debug, Clone)]
pub struct CallSignal {
    rx: watch::Receiver<Lifecycle>,
}

impl CallSignal {
    pub(crate) fn new(rx: watch::Receiver<Lifecycle>) -> Self {
        Self { rx }
    }

    /// Resolve with the abort status once the call aborts.
    ///
    /// Pends forever on a call that completes cleanly; use inside
    /// `select!` against the operation being guarded. Resolves
    /// immediately if the call has already aborted.
    pub async fn aborted(&self) -> Status {
        let mut rx = self.rx.clone();
        let status = match rx.wait_for(|lc| lc.state == CallState::Aborted).await {
            Ok(lc) => lc
                .status
                .clone()
                .unwrap_or_else(|| Status::internal("call aborted without a status")),
            // The call was dropped without reaching a terminal state.
            Err(_) => Status::cancelled("call dropped before completion"),
        };
        status
    }

    /// Resolve with the terminal status once the call reaches any
    /// terminal state, `Completed` included.
    pub async fn terminated(&self) -> Status {
        let mut rx = self.rx.clone();
        let status = match rx.wait_for(|lc| lc.state.is_terminal()).await {
            Ok(lc) => lc.status.clone().unwrap_or_else(Status::ok),
            Err(_) => Status::cancelled("call dropped before completion"),
        };
        status
    }

    /// Current state of the call.
    pub fn state(&self) -> CallState {
        self.rx.borrow().state
    }

    /// Terminal status, if the call has terminated.
    pub fn status(&self) -> Option<Status> {
        self.rx.borrow().status.clone()
    }

    /// Whether the call has aborted.
    pub fn is_aborted(&self) -> bool {
        self.state() == CallState::Aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{Call, CallShape};
    use crate::status::StatusKind;
    use std::time::Duration;

    #[tokio::test]
    async fn test_aborted_resolves_with_status() {
        let call = Call::new(CallShape::Unary, None);
        let signal = call.signal();

        let waiter = tokio::spawn(async move { signal.aborted().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        call.abort(Status::internal("fault"));

        let status = waiter.await.unwrap();
        assert_eq!(status.kind(), StatusKind::Internal);
    }

    #[tokio::test]
    async fn test_aborted_resolves_immediately_when_already_aborted() {
        let call = Call::new(CallShape::Unary, None);
        call.cancel();

        let status = call.signal().aborted().await;
        assert_eq!(status.kind(), StatusKind::Cancelled);
    }

    #[tokio::test]
    async fn test_terminated_resolves_on_completion() {
        let call = Call::new(CallShape::Unary, None);
        let signal = call.signal();

        let waiter = tokio::spawn(async move { signal.terminated().await });
        call.complete();

        let status = waiter.await.unwrap();
        assert!(status.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_call_reads_as_cancelled() {
        let call = Call::new(CallShape::Unary, None);
        let signal = call.signal();
        drop(call);

        let status = signal.aborted().await;
        assert_eq!(status.kind(), StatusKind::Cancelled);
    }

    #[test]
    fn test_state_observation() {
        let call = Call::new(CallShape::BidiStream, None);
        let signal = call.signal();
        assert_eq!(signal.state(), CallState::Open);
        assert!(!signal.is_aborted());

        call.cancel();
        assert!(signal.is_aborted());
        assert!(signal.status().is_some());
    }
}
