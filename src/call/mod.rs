//! Call lifecycle - the state machine shared by all four call shapes.
//!
//! A [`Call`] is one RPC invocation. Whatever its shape, it moves through
//! the same states:
//!
//! ```text
//! Open ──► HalfClosed(side) ──► Completed
//!   │              │
//!   └──────────────┴──────────► Aborted
//! ```
//!
//! `Completed` and `Aborted` are terminal; the first terminal transition
//! wins and records the call's one [`Status`]. Later transitions (a second
//! cancel, a deadline firing after completion) return `false` and change
//! nothing.
//!
//! The shape is data, not control flow: the engine runs one generic driver
//! and consults [`CallShape`] for who may send when.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::status::Status;

mod signal;

pub use signal::CallSignal;

/// The four interaction shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallShape {
    /// One request message, one response message.
    Unary,
    /// One request message, any number of response messages.
    ServerStream,
    /// Any number of request messages, one response message.
    ClientStream,
    /// Both directions stream independently.
    BidiStream,
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallShape::Unary => "unary",
            CallShape::ServerStream => "server_stream",
            CallShape::ClientStream => "client_stream",
            CallShape::BidiStream => "bidi_stream",
        })
    }
}

/// Which side of a call closed its sending direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The initiating side.
    Client,
    /// The handling side.
    Server,
}

/// Observable state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Both directions open.
    Open,
    /// One direction has closed.
    HalfClosed(Side),
    /// Terminal: ran to completion.
    Completed,
    /// Terminal: cancelled, timed out, or failed.
    Aborted,
}

impl CallState {
    /// Whether this state admits no further transitions.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Completed | CallState::Aborted)
    }
}

/// State plus terminal status, published through the call's watch channel
/// so every blocked send/receive observes transitions.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    pub(crate) state: CallState,
    pub(crate) status: Option<Status>,
}

/// One RPC invocation.
///
/// Created by the engine when a call starts, shared via `Arc` between the
/// driver task, the channel endpoints, and the caller's [`CallHandle`];
/// dropped once the last of those lets go.
#[derive(Debug)]
pub struct Call {
    shape: CallShape,
    deadline: Option<Instant>,
    lifecycle: watch::Sender<Lifecycle>,
}

impl Call {
    /// Create a call in the `Open` state. If a deadline is given, a timer
    /// task is spawned that aborts the call with `DeadlineExceeded` when
    /// it fires; the timer exits as soon as the call reaches any terminal
    /// state.
    pub(crate) fn new(shape: CallShape, deadline: Option<Instant>) -> Arc<Self> {
        let (lifecycle, _) = watch::channel(Lifecycle {
            state: CallState::Open,
            status: None,
        });
        let call = Arc::new(Self {
            shape,
            deadline,
            lifecycle,
        });
        if let Some(at) = deadline {
            call.spawn_deadline(at);
        }
        call
    }

    fn spawn_deadline(self: &Arc<Self>, at: Instant) {
        let call = Arc::clone(self);
        tokio::spawn(async move {
            let signal = call.signal();
            tokio::select! {
                _ = tokio::time::sleep_until(at) => {
                    let fired = call.abort(Status::deadline_exceeded(
                        "deadline expired before call completion",
                    ));
                    if fired {
                        tracing::debug!(shape = %call.shape(), "call deadline fired");
                    }
                }
                _ = signal.terminated() => {}
            }
        });
    }

    /// Get the call shape.
    #[inline]
    pub fn shape(&self) -> CallShape {
        self.shape
    }

    /// Get the absolute deadline, if one was set.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Get the current state.
    pub fn state(&self) -> CallState {
        self.lifecycle.borrow().state
    }

    /// Get the terminal status, if the call has terminated.
    pub fn status(&self) -> Option<Status> {
        self.lifecycle.borrow().status.clone()
    }

    /// Subscribe to lifecycle transitions.
    pub fn signal(&self) -> CallSignal {
        CallSignal::new(self.lifecycle.subscribe())
    }

    /// Transition to `Completed` with an `Ok` status.
    ///
    /// Returns `false` if the call was already terminal.
    pub fn complete(&self) -> bool {
        self.lifecycle.send_if_modified(|lc| {
            if lc.state.is_terminal() {
                return false;
            }
            lc.state = CallState::Completed;
            lc.status = Some(Status::ok());
            true
        })
    }

    /// Transition to `Aborted` with the given status, unblocking every
    /// pending send/receive on the call's channels.
    ///
    /// Returns `false` if the call was already terminal.
    pub fn abort(&self, status: Status) -> bool {
        self.lifecycle.send_if_modified(|lc| {
            if lc.state.is_terminal() {
                return false;
            }
            lc.state = CallState::Aborted;
            lc.status = Some(status.clone());
            true
        })
    }

    /// Caller-initiated abort.
    pub fn cancel(&self) -> bool {
        self.abort(Status::cancelled("call cancelled by caller"))
    }

    /// Record that one side closed its sending direction. The first close
    /// moves `Open` to `HalfClosed`; a close of the opposite direction
    /// completes the call. Closing the same direction twice, or closing
    /// after a terminal state, changes nothing.
    pub fn half_close(&self, side: Side) -> bool {
        self.lifecycle.send_if_modified(|lc| match lc.state {
            CallState::Open => {
                lc.state = CallState::HalfClosed(side);
                true
            }
            CallState::HalfClosed(prior) if prior != side => {
                lc.state = CallState::Completed;
                lc.status = Some(Status::ok());
                true
            }
            _ => false,
        })
    }
}

/// Caller-side handle to an in-flight call.
///
/// Cheaply cloneable; lets the initiating side cancel and observe the
/// call without owning the engine-side machinery.
#[derive(Debug, Clone)]
pub struct CallHandle {
    call: Arc<Call>,
}

impl CallHandle {
    pub(crate) fn new(call: Arc<Call>) -> Self {
        Self { call }
    }

    /// Get the call shape.
    pub fn shape(&self) -> CallShape {
        self.call.shape()
    }

    /// Get the current state.
    pub fn state(&self) -> CallState {
        self.call.state()
    }

    /// Get the terminal status, if the call has terminated.
    pub fn status(&self) -> Option<Status> {
        self.call.status()
    }

    /// Cancel the call. Returns `false` if it had already terminated.
    pub fn cancel(&self) -> bool {
        self.call.cancel()
    }

    /// Subscribe to lifecycle transitions.
    pub fn signal(&self) -> CallSignal {
        self.call.signal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusKind;
    use std::time::Duration;

    #[test]
    fn test_new_call_is_open() {
        let call = Call::new(CallShape::Unary, None);
        assert_eq!(call.state(), CallState::Open);
        assert_eq!(call.status(), None);
    }

    #[test]
    fn test_complete_is_terminal() {
        let call = Call::new(CallShape::Unary, None);
        assert!(call.complete());
        assert_eq!(call.state(), CallState::Completed);
        assert!(call.status().is_some_and(|s| s.is_ok()));
    }

    #[test]
    fn test_abort_records_status() {
        let call = Call::new(CallShape::ServerStream, None);
        assert!(call.abort(Status::internal("boom")));
        assert_eq!(call.state(), CallState::Aborted);
        assert_eq!(
            call.status().map(|s| s.kind()),
            Some(StatusKind::Internal)
        );
    }

    #[test]
    fn test_first_terminal_transition_wins() {
        let call = Call::new(CallShape::Unary, None);
        assert!(call.cancel());
        assert!(!call.abort(Status::internal("late")));
        assert!(!call.complete());
        assert!(!call.cancel());
        assert_eq!(
            call.status().map(|s| s.kind()),
            Some(StatusKind::Cancelled)
        );
    }

    #[test]
    fn test_half_close_both_sides_completes() {
        let call = Call::new(CallShape::BidiStream, None);
        assert!(call.half_close(Side::Client));
        assert_eq!(call.state(), CallState::HalfClosed(Side::Client));

        // Same side again is a no-op.
        assert!(!call.half_close(Side::Client));

        assert!(call.half_close(Side::Server));
        assert_eq!(call.state(), CallState::Completed);
    }

    #[test]
    fn test_half_close_after_terminal_is_noop() {
        let call = Call::new(CallShape::BidiStream, None);
        call.cancel();
        assert!(!call.half_close(Side::Client));
        assert_eq!(call.state(), CallState::Aborted);
    }

    #[tokio::test]
    async fn test_deadline_aborts_open_call() {
        let deadline = Instant::now() + Duration::from_millis(10);
        let call = Call::new(CallShape::Unary, Some(deadline));

        let status = call.signal().aborted().await;
        assert_eq!(status.kind(), StatusKind::DeadlineExceeded);
        assert_eq!(call.state(), CallState::Aborted);
    }

    #[tokio::test]
    async fn test_deadline_after_completion_has_no_effect() {
        let deadline = Instant::now() + Duration::from_millis(10);
        let call = Call::new(CallShape::Unary, Some(deadline));
        call.complete();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(call.state(), CallState::Completed);
        assert!(call.status().is_some_and(|s| s.is_ok()));
    }

    #[tokio::test]
    async fn test_handle_cancels_once() {
        let call = Call::new(CallShape::ClientStream, None);
        let handle = CallHandle::new(call.clone());

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(handle.state(), CallState::Aborted);
    }
}
