//! Document store boundary.
//!
//! The CRUD service consumes a store through [`DocumentStore`]; the
//! storage engine behind it is not this crate's concern. The trait
//! surface is the minimal primitive set the adapter needs: single-record
//! insert/find/replace/delete plus a forward-only cursor for
//! enumeration.
//!
//! Write primitives report *outcomes*, not errors, for missing records:
//! `replace_one` and `delete_one` return matched/deleted counts and
//! `find_one` returns an `Option`. Mapping a zero count or a `None` onto
//! the status taxonomy is the adapter's job, not the store's.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

mod id;
mod memory;

pub use id::{DocumentId, InvalidDocumentId, ENCODED_ID_LEN, RAW_ID_LEN};
pub use memory::{MemoryCursor, MemoryStore};

/// Failure inside the store backend itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend fault (connection lost, corrupted state, poisoned lock).
    #[error("store backend error: {0}")]
    Backend(String),

    /// `next` was called on a cursor that has been closed.
    #[error("cursor used after close")]
    CursorClosed,
}

/// A record in the store's native shape: the native identifier plus the
/// encoded non-identifier fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDocument {
    /// Native identifier.
    pub id: DocumentId,
    /// Encoded record fields.
    pub data: Bytes,
}

/// Single-record and enumeration primitives over a document collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a new document, assigning and returning its identifier.
    async fn insert_one(&self, data: Bytes) -> Result<DocumentId, StoreError>;

    /// Fetch the document with the given identifier, if it exists.
    async fn find_one(&self, id: &DocumentId) -> Result<Option<StoreDocument>, StoreError>;

    /// Replace the document with the given identifier wholesale.
    /// Returns the number of documents matched (0 or 1).
    async fn replace_one(&self, id: &DocumentId, data: Bytes) -> Result<u64, StoreError>;

    /// Remove the document with the given identifier.
    /// Returns the number of documents removed (0 or 1).
    async fn delete_one(&self, id: &DocumentId) -> Result<u64, StoreError>;

    /// Open a cursor over the collection. The cursor is bounded by the
    /// document count at open time and is not restartable.
    async fn find(&self) -> Result<Box<dyn DocumentCursor>, StoreError>;
}

/// Forward-only cursor over a collection.
///
/// Implementations must release their underlying resources when dropped,
/// so that a cursor abandoned on an error or cancellation path is still
/// cleaned up; `close` releases them eagerly.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Advance to the next document, or `None` once exhausted.
    async fn next(&mut self) -> Result<Option<StoreDocument>, StoreError>;

    /// Release the cursor. Idempotent.
    fn close(&mut self);
}
