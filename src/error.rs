//! Error types for callwire.

use thiserror::Error;

use crate::status::Status;
use crate::store::StoreError;

/// Main error type for engine plumbing.
///
/// These are the failures the machinery itself can hit — codec errors,
/// closed channels, store backends. They are distinct from [`Status`],
/// which is the caller-visible outcome taxonomy; the conversion between
/// the two lives in `From<CallwireError> for Status` and encodes the
/// propagation policy.
#[derive(Debug, Error)]
pub enum CallwireError {
    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// JSON serialization error (schema listing only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Send or receive on a channel whose sender side has been closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The call terminated while the operation was blocked on it.
    #[error("call aborted: {0}")]
    Aborted(Status),

    /// Document store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias using CallwireError.
pub type Result<T> = std::result::Result<T, CallwireError>;
