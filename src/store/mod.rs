//! Storage abstraction for docpipe.
//!
//! The [`DocumentStore`] trait is the only view the pipeline has of the
//! external document store: bulk clear, bulk insert, aggregation pipelines,
//! and filter-and-project queries. Two backends implement it:
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`SqliteStore`](sqlite::SqliteStore) | JSON documents in SQLite, pipelines compiled to SQL |
//! | [`MemoryStore`](memory::MemoryStore) | In-process evaluation, used by tests |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{CollectionId, Document, Group, Value};
use crate::pipeline::{FindQuery, Pipeline};

/// Field holding each stored document's generated identifier.
pub const ID_FIELD: &str = "_id";

/// Abstract document store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`clear`](DocumentStore::clear) | Delete every document in a collection |
/// | [`insert_many`](DocumentStore::insert_many) | Append a batch of documents |
/// | [`replace_all`](DocumentStore::replace_all) | Clear then insert |
/// | [`count`](DocumentStore::count) | Number of documents in a collection |
/// | [`aggregate`](DocumentStore::aggregate) | Run a grouping pipeline |
/// | [`find`](DocumentStore::find) | Filter and project documents |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Delete all documents in the collection, returning how many went.
    async fn clear(&self, collection: &CollectionId) -> Result<u64>;

    /// Insert documents, assigning each a fresh `_id`.
    async fn insert_many(&self, collection: &CollectionId, docs: &[Document]) -> Result<u64>;

    /// Replace the collection's contents with `docs`.
    ///
    /// The default clears then inserts; backends that can do both
    /// atomically should override it.
    async fn replace_all(&self, collection: &CollectionId, docs: &[Document]) -> Result<u64> {
        self.clear(collection).await?;
        self.insert_many(collection, docs).await
    }

    async fn count(&self, collection: &CollectionId) -> Result<u64>;

    async fn aggregate(&self, collection: &CollectionId, pipeline: &Pipeline)
        -> Result<Vec<Group>>;

    async fn find(&self, collection: &CollectionId, query: &FindQuery) -> Result<Vec<Document>>;
}

/// A store paired with one collection identity.
///
/// Loader and aggregator receive this handle explicitly.
#[derive(Clone, Copy)]
pub struct Collection<'a> {
    store: &'a dyn DocumentStore,
    id: &'a CollectionId,
}

impl<'a> Collection<'a> {
    pub fn new(store: &'a dyn DocumentStore, id: &'a CollectionId) -> Self {
        Self { store, id }
    }

    pub fn id(&self) -> &CollectionId {
        self.id
    }

    pub async fn clear(&self) -> Result<u64> {
        self.store.clear(self.id).await
    }

    pub async fn insert_many(&self, docs: &[Document]) -> Result<u64> {
        self.store.insert_many(self.id, docs).await
    }

    pub async fn replace_all(&self, docs: &[Document]) -> Result<u64> {
        self.store.replace_all(self.id, docs).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count(self.id).await
    }

    pub async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Group>> {
        self.store.aggregate(self.id, pipeline).await
    }

    pub async fn find(&self, query: &FindQuery) -> Result<Vec<Document>> {
        self.store.find(self.id, query).await
    }
}

/// Copy `doc` with a generated `_id` in front, unless it already has one.
pub(crate) fn with_object_id(doc: &Document) -> (String, Document) {
    if let Some(Value::Text(id)) = doc.get(ID_FIELD) {
        return (id.clone(), doc.clone());
    }
    let id = Uuid::new_v4().to_string();
    let mut stored = Document::with_capacity(doc.len() + 1);
    stored.insert(ID_FIELD.to_string(), Value::Text(id.clone()));
    for (k, v) in doc {
        if k != ID_FIELD {
            stored.insert(k.clone(), v.clone());
        }
    }
    (id, stored)
}

/// Keep only the projected fields of `doc`, in projection order. `_id` is
/// dropped unless explicitly projected.
pub(crate) fn project(doc: &Document, projection: &[String]) -> Document {
    projection
        .iter()
        .filter_map(|field| doc.get(field).map(|v| (field.clone(), v.clone())))
        .collect()
}
