//! In-memory document store.
//!
//! The reference [`DocumentStore`] implementation backing the tests and
//! demos. Documents live in a hash map, so enumeration order is
//! arbitrary; a cursor is a point-in-time snapshot taken when `find` is
//! called, which bounds it to the document count at scan start.
//!
//! The store keeps two pieces of accounting that tests lean on: a count
//! of currently open cursors (every cursor must be released exactly
//! once, whatever path the enumeration takes) and a running count of
//! primitive operations (validation failures must be reported without
//! touching the store).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;

use super::{DocumentCursor, DocumentId, DocumentStore, StoreDocument, StoreError};

/// In-memory store over a hash map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<DocumentId, Bytes>>,
    open_cursors: Arc<AtomicUsize>,
    ops: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cursors currently open against this store.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::Acquire)
    }

    /// Number of primitive operations performed so far.
    pub fn op_count(&self) -> usize {
        self.ops.load(Ordering::Relaxed)
    }

    /// Insert a document with a caller-chosen id and raw payload,
    /// bypassing id assignment. Lets tests seed documents with known
    /// identifiers or deliberately undecodable payloads.
    pub fn insert_raw(&self, id: DocumentId, data: Bytes) {
        if let Ok(mut docs) = self.docs.lock() {
            docs.insert(id, data);
        }
    }

    fn locked(&self) -> Result<MutexGuard<'_, HashMap<DocumentId, Bytes>>, StoreError> {
        self.ops.fetch_add(1, Ordering::Relaxed);
        self.docs
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, data: Bytes) -> Result<DocumentId, StoreError> {
        let id = DocumentId::generate();
        self.locked()?.insert(id, data);
        Ok(id)
    }

    async fn find_one(&self, id: &DocumentId) -> Result<Option<StoreDocument>, StoreError> {
        Ok(self.locked()?.get(id).map(|data| StoreDocument {
            id: *id,
            data: data.clone(),
        }))
    }

    async fn replace_one(&self, id: &DocumentId, data: Bytes) -> Result<u64, StoreError> {
        let mut docs = self.locked()?;
        match docs.get_mut(id) {
            Some(slot) => {
                *slot = data;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_one(&self, id: &DocumentId) -> Result<u64, StoreError> {
        Ok(u64::from(self.locked()?.remove(id).is_some()))
    }

    async fn find(&self) -> Result<Box<dyn DocumentCursor>, StoreError> {
        let snapshot: Vec<StoreDocument> = self
            .locked()?
            .iter()
            .map(|(id, data)| StoreDocument {
                id: *id,
                data: data.clone(),
            })
            .collect();

        self.open_cursors.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryCursor {
            docs: snapshot.into_iter(),
            open_count: Some(Arc::clone(&self.open_cursors)),
        }))
    }
}

/// Snapshot cursor over a [`MemoryStore`].
///
/// Holds a slot in the store's open-cursor count until closed or
/// dropped.
#[derive(Debug)]
pub struct MemoryCursor {
    docs: std::vec::IntoIter<StoreDocument>,
    open_count: Option<Arc<AtomicUsize>>,
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn next(&mut self) -> Result<Option<StoreDocument>, StoreError> {
        if self.open_count.is_none() {
            return Err(StoreError::CursorClosed);
        }
        Ok(self.docs.next())
    }

    fn close(&mut self) {
        if let Some(count) = self.open_count.take() {
            count.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(data: &str) -> Bytes {
        Bytes::copy_from_slice(data.as_bytes())
    }

    #[tokio::test]
    async fn test_insert_then_find() {
        let store = MemoryStore::new();
        let id = store.insert_one(doc("alpha")).await.unwrap();

        let found = store.find_one(&id).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.data, doc("alpha"));
    }

    #[tokio::test]
    async fn test_find_missing_is_none_not_error() {
        let store = MemoryStore::new();
        let missing = DocumentId::generate();
        assert_eq!(store.find_one(&missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_reports_matched_count() {
        let store = MemoryStore::new();
        let id = store.insert_one(doc("old")).await.unwrap();

        assert_eq!(store.replace_one(&id, doc("new")).await.unwrap(), 1);
        let found = store.find_one(&id).await.unwrap().unwrap();
        assert_eq!(found.data, doc("new"));

        let missing = DocumentId::generate();
        assert_eq!(store.replace_one(&missing, doc("x")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_reports_deleted_count() {
        let store = MemoryStore::new();
        let id = store.insert_one(doc("gone")).await.unwrap();

        assert_eq!(store.delete_one(&id).await.unwrap(), 1);
        assert_eq!(store.delete_one(&id).await.unwrap(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cursor_yields_snapshot() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store.insert_one(doc(&format!("doc-{i}"))).await.unwrap();
        }

        let mut cursor = store.find().await.unwrap();
        // Documents inserted after the scan started are not visible.
        store.insert_one(doc("late")).await.unwrap();

        let mut seen = 0;
        while cursor.next().await.unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
        cursor.close();
    }

    #[tokio::test]
    async fn test_cursor_over_empty_store() {
        let store = MemoryStore::new();
        let mut cursor = store.find().await.unwrap();
        assert_eq!(cursor.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cursor_accounting_on_close_and_drop() {
        let store = MemoryStore::new();
        store.insert_one(doc("a")).await.unwrap();

        let mut cursor = store.find().await.unwrap();
        assert_eq!(store.open_cursors(), 1);

        cursor.close();
        assert_eq!(store.open_cursors(), 0);
        // Closing twice does not underflow.
        cursor.close();
        assert_eq!(store.open_cursors(), 0);

        let abandoned = store.find().await.unwrap();
        assert_eq!(store.open_cursors(), 1);
        drop(abandoned);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_closed_cursor_refuses_next() {
        let store = MemoryStore::new();
        store.insert_one(doc("a")).await.unwrap();

        let mut cursor = store.find().await.unwrap();
        cursor.close();
        assert_eq!(cursor.next().await, Err(StoreError::CursorClosed));
    }

    #[tokio::test]
    async fn test_op_count_tracks_primitives() {
        let store = MemoryStore::new();
        assert_eq!(store.op_count(), 0);

        let id = store.insert_one(doc("a")).await.unwrap();
        store.find_one(&id).await.unwrap();
        store.delete_one(&id).await.unwrap();
        assert_eq!(store.op_count(), 3);
    }
}
