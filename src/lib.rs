//! # callwire
//!
//! An in-process RPC engine exposing the four classic call shapes -
//! unary, server-stream, client-stream, and bidirectional streaming -
//! plus a CRUD service over a document store that enumerates records as
//! a server stream.
//!
//! ## Architecture
//!
//! - **Channels** ([`channel`]): each direction of a call is one
//!   bounded, ordered message queue with explicit close and
//!   abort-termination semantics.
//! - **Calls** ([`call`]): one state machine
//!   (`Open -> HalfClosed -> Completed/Aborted`) shared by every shape;
//!   the shape is data the driver consults, not four control flows.
//! - **Deadlines & cancellation** ([`call::CallSignal`]): one shared
//!   done-signal per call, selected on at every suspension point.
//! - **Statuses** ([`status`]): a closed outcome taxonomy; every
//!   terminal call carries exactly one.
//! - **Engine** ([`engine`]): registration, the generic driver, and the
//!   typed caller API.
//! - **Store & services** ([`store`], [`services`]): the document-store
//!   boundary, the blog CRUD adapter, and the calculator demos.
//!
//! ## Example
//!
//! ```ignore
//! use callwire::{CallOptions, Engine};
//! use callwire::services::calc::{self, SumRequest, SumResponse};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callwire::Status> {
//!     let engine = calc::engine();
//!
//!     let response: SumResponse = engine
//!         .call_unary(calc::METHOD_SUM, &SumRequest { a: 10, b: 5 }, CallOptions::new())
//!         .await?;
//!     assert_eq!(response.sum, 15);
//!     Ok(())
//! }
//! ```

pub mod call;
pub mod channel;
pub mod codec;
pub mod engine;
pub mod error;
pub mod schema;
pub mod services;
pub mod status;
pub mod store;

pub use call::{CallHandle, CallShape, CallSignal, CallState, Side};
pub use engine::stream::{BidiCall, ClientStreamCall, ServerStreamCall, StreamReceiver, StreamSender};
pub use engine::{CallOptions, Engine, EngineBuilder};
pub use error::{CallwireError, Result};
pub use schema::{MethodDescriptor, ServiceSchema};
pub use status::{Status, StatusKind};
