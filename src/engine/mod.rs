//! Engine - method registration and the generic call driver.
//!
//! The [`EngineBuilder`] provides a fluent API for registering handlers
//! of all four shapes; [`Engine`] runs calls against them. Every call,
//! whatever its shape, goes through the same lifecycle:
//!
//! 1. Look up the method and check the invoked shape against the
//!    registered one.
//! 2. Create the [`Call`] (arming the deadline timer if one was asked
//!    for) and a bounded channel per direction.
//! 3. Spawn the driver task, which waits for a concurrency slot, feeds
//!    the handler, and settles the terminal state.
//!
//! # Example
//!
//! ```ignore
//! use callwire::{CallOptions, Engine};
//!
//! let engine = Engine::builder()
//!     .unary("echo", |value: String| async move { Ok(value) })
//!     .build();
//!
//! let echoed: String = engine
//!     .call_unary("echo", &"hello".to_string(), CallOptions::new())
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::call::{Call, CallHandle, CallShape, Side};
use crate::channel::{self, DEFAULT_CHANNEL_CAPACITY};
use crate::codec::MsgPackCodec;
use crate::schema::ServiceSchema;
use crate::status::Status;

mod registry;
pub mod stream;

use registry::{Inbound, MethodRegistry};
use stream::{
    missing_response, BidiCall, ClientStreamCall, ServerStreamCall, StreamReceiver, StreamSender,
};

/// Default maximum number of concurrently running handlers.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 256;

/// Per-call options supplied by the initiating side.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    deadline: Option<Instant>,
}

impl CallOptions {
    /// Options with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an absolute deadline.
    pub fn deadline_at(mut self, at: Instant) -> Self {
        self.deadline = Some(at);
        self
    }

    /// Set a deadline relative to now.
    pub fn deadline_in(self, timeout: Duration) -> Self {
        self.deadline_at(Instant::now() + timeout)
    }

    /// The configured deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Builder for configuring handlers and engine limits.
pub struct EngineBuilder {
    registry: MethodRegistry,
    channel_capacity: usize,
    max_concurrent_calls: usize,
}

impl EngineBuilder {
    /// Create a builder with default limits and no methods.
    pub fn new() -> Self {
        Self {
            registry: MethodRegistry::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
        }
    }

    /// Register a unary handler: one request in, one response out.
    pub fn unary<F, Req, Resp, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        self.registry.register_unary(method, handler);
        self
    }

    /// Register a server-stream handler: one request in, a stream of
    /// responses out through the provided sender.
    pub fn server_stream<F, Req, Resp, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(Req, StreamSender<Resp>) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        self.registry.register_server_stream(method, handler);
        self
    }

    /// Register a client-stream handler: a stream of requests in, one
    /// aggregate response out. The handler observes the close of the
    /// request stream (`recv` returning `None`) before it can respond.
    pub fn client_stream<F, Req, Resp, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(StreamReceiver<Req>) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        self.registry.register_client_stream(method, handler);
        self
    }

    /// Register a bidi handler: both directions stream independently.
    pub fn bidi<F, Req, Resp, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(StreamReceiver<Req>, StreamSender<Resp>) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        self.registry.register_bidi(method, handler);
        self
    }

    /// Set the per-direction message buffer capacity.
    ///
    /// A producer that outruns the consumer by more than this blocks in
    /// `send` until the consumer catches up. Default: 64.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the maximum number of concurrently running handlers. Calls
    /// past the limit wait for a slot before their handler starts; the
    /// deadline keeps ticking while they wait. Default: 256.
    pub fn max_concurrent_calls(mut self, limit: usize) -> Self {
        self.max_concurrent_calls = limit;
        self
    }

    /// Build the engine.
    pub fn build(self) -> Engine {
        Engine {
            registry: Arc::new(self.registry),
            limiter: Arc::new(Semaphore::new(self.max_concurrent_calls.max(1))),
            channel_capacity: self.channel_capacity,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A built engine serving registered methods.
///
/// Cheaply cloneable; clones share the registry and concurrency limiter.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<MethodRegistry>,
    limiter: Arc<Semaphore>,
    channel_capacity: usize,
}

struct StartedCall {
    call: Arc<Call>,
    request_tx: channel::Sender<Bytes>,
    response_rx: channel::Receiver<Bytes>,
}

impl Engine {
    /// Create an engine builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Describe every registered method.
    pub fn schema(&self) -> ServiceSchema {
        self.registry.describe()
    }

    /// Number of registered methods.
    pub fn method_count(&self) -> usize {
        self.registry.len()
    }

    /// Invoke a unary method: send one request, wait for one response.
    pub async fn call_unary<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<Resp, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Send + 'static,
    {
        let StartedCall {
            call,
            mut request_tx,
            response_rx,
        } = self.start_call(method, CallShape::Unary, &options)?;

        let payload = MsgPackCodec::encode(request).map_err(Status::from)?;
        request_tx.send(Bytes::from(payload)).await.map_err(Status::from)?;
        request_tx.close();

        let mut responses: StreamReceiver<Resp> =
            StreamReceiver::new(response_rx, Arc::clone(&call));
        match responses.recv().await? {
            Some(response) => Ok(response),
            None => Err(missing_response(call.status())),
        }
    }

    /// Invoke a server-stream method: send one request, then receive
    /// responses as the handler produces them.
    pub async fn call_server_stream<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<ServerStreamCall<Resp>, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let StartedCall {
            call,
            mut request_tx,
            response_rx,
        } = self.start_call(method, CallShape::ServerStream, &options)?;

        let payload = MsgPackCodec::encode(request).map_err(Status::from)?;
        request_tx.send(Bytes::from(payload)).await.map_err(Status::from)?;
        request_tx.close();

        Ok(ServerStreamCall::new(
            StreamReceiver::new(response_rx, Arc::clone(&call)),
            CallHandle::new(call),
        ))
    }

    /// Open a client-stream call: send any number of requests, close,
    /// and receive the single aggregate response.
    pub fn call_client_stream<Req, Resp>(
        &self,
        method: &str,
        options: CallOptions,
    ) -> Result<ClientStreamCall<Req, Resp>, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let StartedCall {
            call,
            request_tx,
            response_rx,
        } = self.start_call(method, CallShape::ClientStream, &options)?;

        Ok(ClientStreamCall::new(
            StreamSender::with_half_close(request_tx, Arc::clone(&call), Side::Client),
            StreamReceiver::new(response_rx, Arc::clone(&call)),
            CallHandle::new(call),
        ))
    }

    /// Open a bidi call: both directions stream independently until each
    /// side closes its own.
    pub fn call_bidi<Req, Resp>(
        &self,
        method: &str,
        options: CallOptions,
    ) -> Result<BidiCall<Req, Resp>, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let StartedCall {
            call,
            request_tx,
            response_rx,
        } = self.start_call(method, CallShape::BidiStream, &options)?;

        Ok(BidiCall::new(
            StreamSender::with_half_close(request_tx, Arc::clone(&call), Side::Client),
            StreamReceiver::new(response_rx, Arc::clone(&call)),
            CallHandle::new(call),
        ))
    }

    fn start_call(
        &self,
        method: &str,
        shape: CallShape,
        options: &CallOptions,
    ) -> Result<StartedCall, Status> {
        let registered = self
            .registry
            .shape_of(method)
            .ok_or_else(|| Status::not_found(format!("unknown method {method:?}")))?;
        if registered != shape {
            return Err(Status::invalid_argument(format!(
                "method {method:?} has shape {registered}, invoked as {shape}"
            )));
        }

        let call = Call::new(shape, options.deadline());
        let signal = call.signal();
        let (request_tx, request_rx) = channel::channel(self.channel_capacity, signal.clone());
        let (response_tx, response_rx) = channel::channel(self.channel_capacity, signal);

        tracing::debug!(method, %shape, "call started");
        tokio::spawn(run_call(
            Arc::clone(&self.registry),
            method.to_string(),
            Arc::clone(&call),
            request_rx,
            response_tx,
            Arc::clone(&self.limiter),
        ));

        Ok(StartedCall {
            call,
            request_tx,
            response_rx,
        })
    }
}

/// Settles a call that would otherwise be left dangling: if the driver
/// unwinds without reaching a terminal transition (a handler panic, for
/// one), the guard aborts the call so blocked peers unblock.
struct SettleGuard {
    call: Arc<Call>,
    armed: bool,
}

impl SettleGuard {
    fn new(call: Arc<Call>) -> Self {
        Self { call, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if self.armed {
            self.call
                .abort(Status::internal("call driver terminated unexpectedly"));
        }
    }
}

/// The generic driver: one body for all four shapes, with the shape
/// consulted as data where the protocols differ.
async fn run_call(
    registry: Arc<MethodRegistry>,
    method: String,
    call: Arc<Call>,
    mut request_rx: channel::Receiver<Bytes>,
    response_tx: channel::Sender<Bytes>,
    limiter: Arc<Semaphore>,
) {
    let mut guard = SettleGuard::new(Arc::clone(&call));
    let signal = call.signal();

    // Keeps the response channel from reading as closed until the
    // terminal state below is settled; without this a caller could see a
    // clean close race ahead of the abort status.
    let _keepalive = response_tx.raw();

    let _permit = tokio::select! {
        biased;
        _ = signal.aborted() => {
            guard.disarm();
            return;
        }
        permit = limiter.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                call.abort(Status::internal("engine concurrency limiter closed"));
                guard.disarm();
                return;
            }
        }
    };

    let Some(entry) = registry.get(&method) else {
        // The registry is immutable after build, so this only fires if a
        // caller races an engine teardown.
        call.abort(Status::not_found(format!("unknown method {method:?}")));
        guard.disarm();
        return;
    };

    // Who may send when is data: unary and server-stream calls carry
    // exactly one request message, which the driver collects before the
    // handler runs; the client-streaming shapes hand the handler the
    // whole inbound channel.
    let inbound = match entry.shape {
        CallShape::Unary | CallShape::ServerStream => match request_rx.recv().await {
            Ok(Some(payload)) => Inbound::Single(payload),
            Ok(None) => {
                call.abort(Status::invalid_argument(
                    "call closed without a request message",
                ));
                guard.disarm();
                return;
            }
            Err(err) => {
                call.abort(Status::from(err));
                guard.disarm();
                return;
            }
        },
        CallShape::ClientStream | CallShape::BidiStream => Inbound::Stream(request_rx),
    };

    let shape = entry.shape;
    let handler = entry.handler.invoke(Arc::clone(&call), inbound, response_tx);
    let result = tokio::select! {
        biased;
        status = signal.aborted() => Err(status),
        result = handler => result,
    };

    match result {
        Ok(()) => match shape {
            // A bidi call completes only once the client direction is
            // also closed; the other shapes are done when the handler is.
            CallShape::BidiStream => {
                call.half_close(Side::Server);
            }
            _ => {
                call.complete();
            }
        },
        Err(status) => {
            if call.abort(status.clone()) {
                tracing::debug!(method = %method, %status, "call aborted");
            }
        }
    }
    guard.disarm();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusKind;

    fn echo_engine() -> Engine {
        Engine::builder()
            .unary("echo", |value: i64| async move { Ok(value) })
            .build()
    }

    #[tokio::test]
    async fn test_unary_round_trip() {
        let engine = echo_engine();
        let result: i64 = engine
            .call_unary("echo", &42i64, CallOptions::new())
            .await
            .unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_unknown_method_is_not_found() {
        let engine = echo_engine();
        let result: Result<i64, Status> = engine
            .call_unary("missing", &1i64, CallOptions::new())
            .await;
        assert_eq!(result.unwrap_err().kind(), StatusKind::NotFound);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_invalid_argument() {
        let engine = echo_engine();
        let result = engine.call_bidi::<i64, i64>("echo", CallOptions::new());
        assert_eq!(result.unwrap_err().kind(), StatusKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_handler_error_surfaces_to_caller() {
        let engine = Engine::builder()
            .unary("fail", |_: i64| async move {
                Err::<i64, _>(Status::internal("handler fault"))
            })
            .build();

        let result: Result<i64, Status> =
            engine.call_unary("fail", &1i64, CallOptions::new()).await;
        let status = result.unwrap_err();
        assert_eq!(status.kind(), StatusKind::Internal);
        assert!(status.message().contains("handler fault"));
    }

    #[tokio::test]
    async fn test_schema_reflects_registrations() {
        let engine = Engine::builder()
            .unary("a.one", |v: i64| async move { Ok(v) })
            .server_stream("a.two", |_: i64, _out: StreamSender<i64>| async move {
                Ok(())
            })
            .build();

        let schema = engine.schema();
        assert_eq!(engine.method_count(), 2);
        assert_eq!(schema.get("a.one").map(|m| m.shape), Some(CallShape::Unary));
        assert_eq!(
            schema.get("a.two").map(|m| m.shape),
            Some(CallShape::ServerStream)
        );
    }

    #[tokio::test]
    async fn test_concurrency_limit_queues_calls() {
        // One slot: the second call waits for the first to finish.
        let engine = Engine::builder()
            .unary("sleepy", |ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            })
            .max_concurrent_calls(1)
            .build();

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .call_unary::<u64, u64>("sleepy", &30, CallOptions::new())
                    .await
            })
        };
        let second = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .call_unary::<u64, u64>("sleepy", &1, CallOptions::new())
                    .await
            })
        };

        assert_eq!(first.await.unwrap().unwrap(), 30);
        assert_eq!(second.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deadline_aborts_slow_unary() {
        let engine = Engine::builder()
            .unary("slow", |_: i64| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(0i64)
            })
            .build();

        let result: Result<i64, Status> = engine
            .call_unary(
                "slow",
                &1i64,
                CallOptions::new().deadline_in(Duration::from_millis(20)),
            )
            .await;
        assert_eq!(result.unwrap_err().kind(), StatusKind::DeadlineExceeded);
    }
}
