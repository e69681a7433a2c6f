//! The seam between the index facade and a backing document store.

use async_trait::async_trait;
use di_core::{CollectionSpec, Document, FilterExpr};
use serde_json::{Map, Value};

use crate::error::Result;

/// A candidate returned by [`DocumentStore::vector_search`]. `distance` is
/// the raw metric distance: lower is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub document: Document,
    pub distance: f32,
}

/// One open connection to one collection.
///
/// Every call is atomic per document. Nothing is promised across documents
/// or across calls: a reader may observe any state between two whole calls
/// of a concurrent writer.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Identity and schema of the attached collection.
    fn spec(&self) -> &CollectionSpec;

    /// Create or overwrite every document by id. Later duplicates in the
    /// same batch win.
    async fn upsert(&self, docs: &[Document]) -> Result<()>;

    /// Overwrite documents whose id is already present and leave the rest
    /// alone. The returned flags line up with `docs`.
    async fn replace_existing(&self, docs: &[Document]) -> Result<Vec<bool>>;

    async fn get(&self, ids: &[String]) -> Result<Vec<Option<Document>>>;

    /// Remove ids, ignoring absent ones. Returns how many were removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Up to `k` nearest documents passing `filter`, closest first.
    /// `k = None` returns every candidate.
    async fn vector_search(
        &self,
        query: &[f32],
        k: Option<usize>,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RawHit>>;

    /// All documents passing `filter`, in store order.
    async fn scan(&self, filter: Option<&FilterExpr>) -> Result<Vec<Document>>;

    /// Remove every document, keeping the collection and its schema.
    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    /// Make every acknowledged write durable.
    async fn flush(&self) -> Result<()>;

    /// Flush and release the connection. Idempotent. Synchronous so it can
    /// run from `Drop`.
    fn close(&self) -> Result<()>;
}

/// Opens [`DocumentStore`] handles for configured hosts.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Attach to the collection described by `spec`, creating it if it does
    /// not exist. Fails with `CollectionMismatch` if it exists with another
    /// identity.
    async fn connect(
        &self,
        hosts: &[String],
        spec: &CollectionSpec,
        options: &Map<String, Value>,
    ) -> Result<Box<dyn DocumentStore>>;
}
