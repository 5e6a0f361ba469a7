//! Method registry - maps method names to shape-typed handlers.
//!
//! Each registration wraps a user closure in a typed adapter that
//! decodes the request side, encodes the response side, and enforces the
//! shape's message cardinality. The adapters erase to one byte-level
//! [`ShapeHandler`] trait so the engine can run a single generic driver:
//! the shape is carried as data next to the handler, and "who may send
//! when" is decided by the driver, not by four copies of the control
//! flow.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::stream::{StreamReceiver, StreamSender};
use crate::call::{Call, CallShape};
use crate::channel::{Receiver, Sender};
use crate::codec::MsgPackCodec;
use crate::schema::ServiceSchema;
use crate::status::Status;

/// Boxed future for handler results.
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The request side of an invocation, shaped by the driver: unary and
/// server-stream calls carry exactly one request message, the streaming
/// shapes hand the handler the whole inbound channel.
pub(crate) enum Inbound {
    Single(Bytes),
    Stream(Receiver<Bytes>),
}

/// Byte-level handler interface every shape adapter erases to.
pub(crate) trait ShapeHandler: Send + Sync {
    fn invoke(
        &self,
        call: Arc<Call>,
        inbound: Inbound,
        outbound: Sender<Bytes>,
    ) -> BoxFuture<'static, Result<(), Status>>;
}

fn fail(status: Status) -> BoxFuture<'static, Result<(), Status>> {
    Box::pin(async move { Err(status) })
}

fn decode_request<Req: DeserializeOwned>(payload: &Bytes) -> Result<Req, Status> {
    MsgPackCodec::decode(payload)
        .map_err(|err| Status::invalid_argument(format!("undecodable request: {err}")))
}

/// Adapter for unary handlers: `Fn(Req) -> Result<Resp, Status>`.
struct UnaryMethod<F, Req, Resp, Fut> {
    handler: F,
    _marker: PhantomData<fn(Req) -> (Resp, Fut)>,
}

impl<F, Req, Resp, Fut> ShapeHandler for UnaryMethod<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
{
    fn invoke(
        &self,
        _call: Arc<Call>,
        inbound: Inbound,
        outbound: Sender<Bytes>,
    ) -> BoxFuture<'static, Result<(), Status>> {
        let Inbound::Single(payload) = inbound else {
            return fail(Status::internal("unary handler invoked with a streaming request"));
        };
        let request = match decode_request(&payload) {
            Ok(request) => request,
            Err(status) => return fail(status),
        };
        let fut = (self.handler)(request);
        Box::pin(async move {
            let response = fut.await?;
            let payload = MsgPackCodec::encode(&response).map_err(Status::from)?;
            outbound.send(Bytes::from(payload)).await.map_err(Status::from)
        })
    }
}

/// Adapter for server-stream handlers:
/// `Fn(Req, StreamSender<Resp>) -> Result<(), Status>`.
struct ServerStreamMethod<F, Req, Resp, Fut> {
    handler: F,
    _marker: PhantomData<fn(Req) -> (Resp, Fut)>,
}

impl<F, Req, Resp, Fut> ShapeHandler for ServerStreamMethod<F, Req, Resp, Fut>
where
    F: Fn(Req, StreamSender<Resp>) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    fn invoke(
        &self,
        call: Arc<Call>,
        inbound: Inbound,
        outbound: Sender<Bytes>,
    ) -> BoxFuture<'static, Result<(), Status>> {
        let Inbound::Single(payload) = inbound else {
            return fail(Status::internal(
                "server-stream handler invoked with a streaming request",
            ));
        };
        let request = match decode_request(&payload) {
            Ok(request) => request,
            Err(status) => return fail(status),
        };
        let responses = StreamSender::new(outbound, call);
        Box::pin((self.handler)(request, responses))
    }
}

/// Adapter for client-stream handlers:
/// `Fn(StreamReceiver<Req>) -> Result<Resp, Status>`.
struct ClientStreamMethod<F, Req, Resp, Fut> {
    handler: F,
    _marker: PhantomData<fn(Req) -> (Resp, Fut)>,
}

impl<F, Req, Resp, Fut> ShapeHandler for ClientStreamMethod<F, Req, Resp, Fut>
where
    F: Fn(StreamReceiver<Req>) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
{
    fn invoke(
        &self,
        call: Arc<Call>,
        inbound: Inbound,
        outbound: Sender<Bytes>,
    ) -> BoxFuture<'static, Result<(), Status>> {
        let Inbound::Stream(requests) = inbound else {
            return fail(Status::internal(
                "client-stream handler invoked with a single request",
            ));
        };
        let requests = StreamReceiver::new(requests, call);
        let fut = (self.handler)(requests);
        Box::pin(async move {
            let response = fut.await?;
            let payload = MsgPackCodec::encode(&response).map_err(Status::from)?;
            outbound.send(Bytes::from(payload)).await.map_err(Status::from)
        })
    }
}

/// Adapter for bidi handlers:
/// `Fn(StreamReceiver<Req>, StreamSender<Resp>) -> Result<(), Status>`.
struct BidiMethod<F, Req, Resp, Fut> {
    handler: F,
    _marker: PhantomData<fn(Req) -> (Resp, Fut)>,
}

impl<F, Req, Resp, Fut> ShapeHandler for BidiMethod<F, Req, Resp, Fut>
where
    F: Fn(StreamReceiver<Req>, StreamSender<Resp>) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    fn invoke(
        &self,
        call: Arc<Call>,
        inbound: Inbound,
        outbound: Sender<Bytes>,
    ) -> BoxFuture<'static, Result<(), Status>> {
        let Inbound::Stream(requests) = inbound else {
            return fail(Status::internal("bidi handler invoked with a single request"));
        };
        let requests = StreamReceiver::new(requests, Arc::clone(&call));
        let responses = StreamSender::new(outbound, call);
        Box::pin((self.handler)(requests, responses))
    }
}

/// Entry for a registered method.
pub(crate) struct MethodEntry {
    pub(crate) shape: CallShape,
    pub(crate) handler: Box<dyn ShapeHandler>,
}

/// Registry mapping method names to shape-typed handlers.
#[derive(Default)]
pub(crate) struct MethodRegistry {
    methods: HashMap<String, MethodEntry>,
}

impl MethodRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: &str, entry: MethodEntry) {
        if self.methods.insert(name.to_string(), entry).is_some() {
            tracing::warn!(method = name, "method registered twice, replacing handler");
        }
    }

    pub(crate) fn register_unary<F, Req, Resp, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        self.insert(
            name,
            MethodEntry {
                shape: CallShape::Unary,
                handler: Box::new(UnaryMethod {
                    handler,
                    _marker: PhantomData,
                }),
            },
        );
    }

    pub(crate) fn register_server_stream<F, Req, Resp, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Req, StreamSender<Resp>) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        self.insert(
            name,
            MethodEntry {
                shape: CallShape::ServerStream,
                handler: Box::new(ServerStreamMethod {
                    handler,
                    _marker: PhantomData,
                }),
            },
        );
    }

    pub(crate) fn register_client_stream<F, Req, Resp, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(StreamReceiver<Req>) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        self.insert(
            name,
            MethodEntry {
                shape: CallShape::ClientStream,
                handler: Box::new(ClientStreamMethod {
                    handler,
                    _marker: PhantomData,
                }),
            },
        );
    }

    pub(crate) fn register_bidi<F, Req, Resp, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(StreamReceiver<Req>, StreamSender<Resp>) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        self.insert(
            name,
            MethodEntry {
                shape: CallShape::BidiStream,
                handler: Box::new(BidiMethod {
                    handler,
                    _marker: PhantomData,
                }),
            },
        );
    }

    /// Look up a method entry by name.
    pub(crate) fn get(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.get(name)
    }

    /// Shape of a registered method.
    pub(crate) fn shape_of(&self, name: &str) -> Option<CallShape> {
        self.methods.get(name).map(|entry| entry.shape)
    }

    /// Number of registered methods.
    pub(crate) fn len(&self) -> usize {
        self.methods.len()
    }

    /// Describe every registered method, sorted by name.
    pub(crate) fn describe(&self) -> ServiceSchema {
        let mut schema = ServiceSchema::new();
        for (name, entry) in &self.methods {
            schema.add_method(name, entry.shape);
        }
        schema
    }
}
