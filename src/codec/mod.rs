//! Codec module - serialization of message payloads and store documents.
//!
//! Everything that crosses a call boundary or lands in the document store
//! goes through [`MsgPackCodec`]. The codec is a marker struct with
//! static methods rather than a trait object, so call sites pick it at
//! compile time.

mod msgpack;

pub use msgpack::MsgPackCodec;
