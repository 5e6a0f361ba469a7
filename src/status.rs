//! Call status taxonomy.
//!
//! Every terminal call carries exactly one [`Status`]: an [`Ok`] one for
//! calls that ran to completion, an error one otherwise. The kind set is
//! closed — handlers and the CRUD adapter pick from it directly, and
//! plumbing failures convert through `From<CallwireError>` so the mapping
//! policy lives in one place.
//!
//! [`Ok`]: StatusKind::Ok
//!
//! # Example
//!
//! ```
//! use callwire::status::{Status, StatusKind};
//!
//! let status = Status::invalid_argument("id is not in hex format");
//! assert_eq!(status.kind(), StatusKind::InvalidArgument);
//! assert!(!status.is_ok());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CallwireError;
use crate::store::StoreError;

/// Classification of a terminal call outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// Call ran to completion.
    Ok,
    /// Malformed input: unparsable identifier, out-of-domain number,
    /// undecodable request payload.
    InvalidArgument,
    /// The operation targeted a record (or method) that does not exist.
    NotFound,
    /// The deadline fired before the call completed.
    DeadlineExceeded,
    /// Caller-initiated abort.
    Cancelled,
    /// Store failure, decode failure, or any unexpected fault.
    Internal,
    /// Reserved for write-conflict detection; no current operation
    /// produces it.
    AlreadyExists,
}

impl StatusKind {
    /// Canonical name, matching the wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Ok => "ok",
            StatusKind::InvalidArgument => "invalid_argument",
            StatusKind::NotFound => "not_found",
            StatusKind::DeadlineExceeded => "deadline_exceeded",
            StatusKind::Cancelled => "cancelled",
            StatusKind::Internal => "internal",
            StatusKind::AlreadyExists => "already_exists",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a call: a kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Status {
    kind: StatusKind,
    message: String,
}

impl Status {
    /// Create a status with an explicit kind.
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Successful completion.
    pub fn ok() -> Self {
        Self::new(StatusKind::Ok, "")
    }

    /// Malformed input.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusKind::InvalidArgument, message)
    }

    /// Missing record or method.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusKind::NotFound, message)
    }

    /// Deadline fired before completion.
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(StatusKind::DeadlineExceeded, message)
    }

    /// Caller-initiated abort.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Cancelled, message)
    }

    /// Unexpected fault.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Internal, message)
    }

    /// Get the status kind.
    #[inline]
    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    /// Get the status message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this is a successful outcome.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.kind == StatusKind::Ok
    }
}

/// Mapping policy from plumbing errors onto the taxonomy.
///
/// Codec and channel failures have no caller-meaningful kind of their own:
/// encode/decode problems are `Internal`, a closed message channel means
/// the consuming side went away (`Cancelled`), and an abort carries its
/// own status through unchanged. Store errors are always `Internal` —
/// "not found" is a store *outcome* (empty find, zero matched count), not
/// a store error, and is mapped where the outcome is observed.
impl From<CallwireError> for Status {
    fn from(err: CallwireError) -> Self {
        match err {
            CallwireError::Aborted(status) => status,
            CallwireError::ChannelClosed => Status::cancelled("message channel closed"),
            CallwireError::Encode(e) => Status::internal(format!("payload encode error: {e}")),
            CallwireError::Decode(e) => Status::internal(format!("payload decode error: {e}")),
            CallwireError::Json(e) => Status::internal(format!("schema encode error: {e}")),
            CallwireError::Store(e) => Status::internal(format!("store error: {e}")),
        }
    }
}

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        Status::internal(format!("store error: {err}"))
    }
}
