//! Typed endpoints over the byte-level channels of a call.
//!
//! Handlers and callers never touch raw payloads: a [`StreamSender`]
//! encodes each item on the way out and a [`StreamReceiver`] decodes on
//! the way in. The per-shape caller handles ([`ServerStreamCall`],
//! [`ClientStreamCall`], [`BidiCall`]) bundle the endpoints with the
//! [`CallHandle`] for cancellation.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::call::{Call, CallHandle, Side};
use crate::channel;
use crate::codec::MsgPackCodec;
use crate::status::Status;

/// Typed producing end of one call direction.
///
/// Closing is idempotent and also happens on drop, so a handler that
/// returns (or a caller that lets go) always ends its direction. When
/// the sender belongs to the initiating side of a client-stream or bidi
/// call, closing it is the `closeSend` of the protocol and half-closes
/// the call.
#[derive(Debug)]
pub struct StreamSender<T> {
    inner: channel::Sender<Bytes>,
    call: Arc<Call>,
    half_close: Option<Side>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Serialize> StreamSender<T> {
    pub(crate) fn new(inner: channel::Sender<Bytes>, call: Arc<Call>) -> Self {
        Self {
            inner,
            call,
            half_close: None,
            _marker: PhantomData,
        }
    }

    pub(crate) fn with_half_close(
        inner: channel::Sender<Bytes>,
        call: Arc<Call>,
        side: Side,
    ) -> Self {
        Self {
            inner,
            call,
            half_close: Some(side),
            _marker: PhantomData,
        }
    }

    /// Encode and enqueue one item, waiting for buffer space if the
    /// consumer is behind.
    pub async fn send(&self, item: &T) -> Result<(), Status> {
        let payload = MsgPackCodec::encode(item).map_err(Status::from)?;
        self.inner.send(Bytes::from(payload)).await.map_err(Status::from)
    }
}

impl<T> StreamSender<T> {
    /// Close this direction. Idempotent.
    pub fn close(&mut self) {
        if self.inner.is_closed() {
            return;
        }
        self.inner.close();
        if let Some(side) = self.half_close {
            self.call.half_close(side);
        }
    }

    /// Whether this direction has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<T> Drop for StreamSender<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Typed consuming end of one call direction.
#[derive(Debug)]
pub struct StreamReceiver<T> {
    inner: channel::Receiver<Bytes>,
    call: Arc<Call>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> StreamReceiver<T> {
    pub(crate) fn new(inner: channel::Receiver<Bytes>, call: Arc<Call>) -> Self {
        Self {
            inner,
            call,
            _marker: PhantomData,
        }
    }

    /// Receive and decode the next item.
    ///
    /// `Ok(None)` is the clean close of this direction. A payload that
    /// fails to decode aborts the call with `Internal`: items already
    /// received stay valid, nothing further is delivered.
    pub async fn recv(&mut self) -> Result<Option<T>, Status> {
        match self.inner.recv().await {
            Ok(Some(payload)) => match MsgPackCodec::decode(&payload) {
                Ok(item) => Ok(Some(item)),
                Err(err) => {
                    let status =
                        Status::internal(format!("undecodable stream message: {err}"));
                    self.call.abort(status.clone());
                    Err(status)
                }
            },
            Ok(None) => Ok(None),
            Err(err) => Err(Status::from(err)),
        }
    }
}

/// The caller's side of a server-stream call: one request already sent,
/// responses arrive here.
#[derive(Debug)]
pub struct ServerStreamCall<Resp> {
    receiver: StreamReceiver<Resp>,
    handle: CallHandle,
}

impl<Resp: DeserializeOwned> ServerStreamCall<Resp> {
    pub(crate) fn new(receiver: StreamReceiver<Resp>, handle: CallHandle) -> Self {
        Self { receiver, handle }
    }

    /// Receive the next streamed response, `Ok(None)` on clean close.
    pub async fn recv(&mut self) -> Result<Option<Resp>, Status> {
        self.receiver.recv().await
    }

    /// Handle for cancellation and status observation.
    pub fn handle(&self) -> &CallHandle {
        &self.handle
    }
}

/// The caller's side of a client-stream call: send any number of
/// requests, then close and wait for the single aggregate response.
#[derive(Debug)]
pub struct ClientStreamCall<Req, Resp> {
    sender: StreamSender<Req>,
    receiver: StreamReceiver<Resp>,
    handle: CallHandle,
}

impl<Req: Serialize, Resp: DeserializeOwned> ClientStreamCall<Req, Resp> {
    pub(crate) fn new(
        sender: StreamSender<Req>,
        receiver: StreamReceiver<Resp>,
        handle: CallHandle,
    ) -> Self {
        Self {
            sender,
            receiver,
            handle,
        }
    }

    /// Send one request message.
    pub async fn send(&self, item: &Req) -> Result<(), Status> {
        self.sender.send(item).await
    }

    /// Close the request direction and wait for the aggregate response.
    /// The handler only starts computing once it observes the close.
    pub async fn close_and_recv(mut self) -> Result<Resp, Status> {
        self.sender.close();
        match self.receiver.recv().await? {
            Some(response) => Ok(response),
            None => Err(missing_response(self.handle.status())),
        }
    }

    /// Handle for cancellation and status observation.
    pub fn handle(&self) -> &CallHandle {
        &self.handle
    }
}

/// The caller's side of a bidi call. The two directions are independent;
/// `split` hands them to separate tasks.
#[derive(Debug)]
pub struct BidiCall<Req, Resp> {
    sender: StreamSender<Req>,
    receiver: StreamReceiver<Resp>,
    handle: CallHandle,
}

impl<Req: Serialize, Resp: DeserializeOwned> BidiCall<Req, Resp> {
    pub(crate) fn new(
        sender: StreamSender<Req>,
        receiver: StreamReceiver<Resp>,
        handle: CallHandle,
    ) -> Self {
        Self {
            sender,
            receiver,
            handle,
        }
    }

    /// Send one request message.
    pub async fn send(&self, item: &Req) -> Result<(), Status> {
        self.sender.send(item).await
    }

    /// Receive the next response, `Ok(None)` once the handler closed its
    /// direction.
    pub async fn recv(&mut self) -> Result<Option<Resp>, Status> {
        self.receiver.recv().await
    }

    /// Close the request direction (`closeSend`); responses may keep
    /// arriving until the handler closes its own direction.
    pub fn close_send(&mut self) {
        self.sender.close();
    }

    /// Split into independent send and receive halves plus the handle,
    /// for driving the two directions from separate tasks.
    pub fn split(self) -> (StreamSender<Req>, StreamReceiver<Resp>, CallHandle) {
        (self.sender, self.receiver, self.handle)
    }

    /// Handle for cancellation and status observation.
    pub fn handle(&self) -> &CallHandle {
        &self.handle
    }
}

/// Status for a response direction that closed without delivering the
/// expected message: the call's own error if it has one, `Internal`
/// otherwise.
pub(crate) fn missing_response(terminal: Option<Status>) -> Status {
    terminal
        .filter(|status| !status.is_ok())
        .unwrap_or_else(|| Status::internal("call ended without a response"))
}
