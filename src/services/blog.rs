//! Blog service - CRUD over a document store.
//!
//! Four single-record operations plus a server-streamed enumeration,
//! each translating between the wire record ([`Blog`]) and the store's
//! native document shape, and mapping store outcomes onto the status
//! taxonomy:
//!
//! - malformed identifiers are `InvalidArgument`, reported before the
//!   store is touched;
//! - an empty find, a zero matched count, and a zero deleted count are
//!   all `NotFound`;
//! - store faults and undecodable documents are `Internal`.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::MsgPackCodec;
use crate::engine::stream::StreamSender;
use crate::engine::EngineBuilder;
use crate::status::Status;
use crate::store::{DocumentId, DocumentStore, StoreDocument};

/// Method name for `create`.
pub const METHOD_CREATE: &str = "blog.create";
/// Method name for `read`.
pub const METHOD_READ: &str = "blog.read";
/// Method name for `update`.
pub const METHOD_UPDATE: &str = "blog.update";
/// Method name for `delete`.
pub const METHOD_DELETE: &str = "blog.delete";
/// Method name for `list`.
pub const METHOD_LIST: &str = "blog.list";

/// Wire shape of a blog record.
///
/// `id` is absent until the record is first persisted and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blog {
    /// Opaque record identifier; `None` before creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Author the record belongs to.
    pub author_id: String,
    /// Record title.
    pub title: String,
    /// Record body.
    pub content: String,
}

/// The non-identifier fields as they are stored; the identifier lives in
/// the document's native id, not in the payload.
#[derive(Debug, Serialize, Deserialize)]
struct BlogDocument {
    author_id: String,
    title: String,
    content: String,
}

/// CRUD adapter over a [`DocumentStore`].
pub struct BlogService {
    store: Arc<dyn DocumentStore>,
}

impl BlogService {
    /// Create a service over the given store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist a new record and return it with its assigned identifier.
    pub async fn create(&self, blog: Blog) -> Result<Blog, Status> {
        if blog.id.is_some() {
            return Err(Status::invalid_argument(
                "record to create must not carry an identifier",
            ));
        }

        let data = encode_fields(&blog)?;
        let id = self.store.insert_one(data).await.map_err(Status::from)?;

        Ok(Blog {
            id: Some(id.to_hex()),
            ..blog
        })
    }

    /// Fetch the record with the given identifier.
    pub async fn read(&self, id: &str) -> Result<Blog, Status> {
        let native = parse_id(id)?;
        match self.store.find_one(&native).await.map_err(Status::from)? {
            Some(document) => decode_document(&document),
            None => Err(Status::not_found(format!("no record with id {id}"))),
        }
    }

    /// Replace the record wholesale, keyed by its identifier. Returns
    /// the record as given, not re-read from the store.
    pub async fn update(&self, blog: Blog) -> Result<Blog, Status> {
        let id = blog
            .id
            .as_deref()
            .ok_or_else(|| Status::invalid_argument("record to update must carry an identifier"))?;
        let native = parse_id(id)?;

        let data = encode_fields(&blog)?;
        let matched = self
            .store
            .replace_one(&native, data)
            .await
            .map_err(Status::from)?;
        if matched == 0 {
            return Err(Status::not_found(format!("no record with id {id}")));
        }

        Ok(blog)
    }

    /// Remove the record with the given identifier; returns the
    /// identifier of the removed record.
    pub async fn delete(&self, id: &str) -> Result<String, Status> {
        let native = parse_id(id)?;
        let deleted = self
            .store
            .delete_one(&native)
            .await
            .map_err(Status::from)?;
        if deleted == 0 {
            return Err(Status::not_found(format!("no record with id {id}")));
        }
        Ok(id.to_string())
    }

    /// Stream every record, one message per document.
    ///
    /// The cursor is a snapshot taken at scan start. Each document is
    /// decoded independently: a decode failure ends the stream with
    /// `Internal` while everything already sent stays delivered. The
    /// cursor is released on every exit path - it closes on drop, so
    /// early returns and cancellation are covered too.
    pub async fn list(&self, out: &StreamSender<Blog>) -> Result<(), Status> {
        let mut cursor = self.store.find().await.map_err(Status::from)?;

        while let Some(document) = cursor.next().await.map_err(Status::from)? {
            let blog = decode_document(&document)?;
            out.send(&blog).await?;
        }

        cursor.close();
        Ok(())
    }

    /// Register the five operations on an engine builder.
    pub fn register(self, builder: EngineBuilder) -> EngineBuilder {
        let service = Arc::new(self);

        let create = Arc::clone(&service);
        let read = Arc::clone(&service);
        let update = Arc::clone(&service);
        let delete = Arc::clone(&service);
        let list = service;

        builder
            .unary(METHOD_CREATE, move |blog: Blog| {
                let service = Arc::clone(&create);
                async move { service.create(blog).await }
            })
            .unary(METHOD_READ, move |id: String| {
                let service = Arc::clone(&read);
                async move { service.read(&id).await }
            })
            .unary(METHOD_UPDATE, move |blog: Blog| {
                let service = Arc::clone(&update);
                async move { service.update(blog).await }
            })
            .unary(METHOD_DELETE, move |id: String| {
                let service = Arc::clone(&delete);
                async move { service.delete(&id).await }
            })
            .server_stream(METHOD_LIST, move |_: (), out: StreamSender<Blog>| {
                let service = Arc::clone(&list);
                async move { service.list(&out).await }
            })
    }
}

fn parse_id(id: &str) -> Result<DocumentId, Status> {
    DocumentId::parse_hex(id)
        .map_err(|err| Status::invalid_argument(format!("invalid record id {id:?}: {err}")))
}

fn encode_fields(blog: &Blog) -> Result<Bytes, Status> {
    let fields = BlogDocument {
        author_id: blog.author_id.clone(),
        title: blog.title.clone(),
        content: blog.content.clone(),
    };
    let payload = MsgPackCodec::encode(&fields)
        .map_err(|err| Status::internal(format!("cannot encode record: {err}")))?;
    Ok(Bytes::from(payload))
}

fn decode_document(document: &StoreDocument) -> Result<Blog, Status> {
    let fields: BlogDocument = MsgPackCodec::decode(&document.data).map_err(|err| {
        tracing::warn!(id = %document.id, "undecodable stored document");
        Status::internal(format!("cannot decode stored record: {err}"))
    })?;
    Ok(Blog {
        id: Some(document.id.to_hex()),
        author_id: fields.author_id,
        title: fields.title,
        content: fields.content,
    })
}

/// Build an engine serving only the blog methods over the given store.
pub fn engine(store: Arc<dyn DocumentStore>) -> crate::engine::Engine {
    BlogService::new(store).register(EngineBuilder::new()).build()
}
