use async_trait::async_trait;
use di_core::{CollectionSpec, Document, FilterExpr};
use parking_lot::Mutex;
use std::sync::Arc;

use super::cluster::LocalCluster;
use super::collection::Collection;
use crate::backend::{DocumentStore, RawHit};
use crate::error::{Result, StoreError};

/// Run a write off the async worker: every local write ends in fsync.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Other(anyhow::Error::new(e)))?
}

/// A connection to one collection of a [`LocalCluster`].
pub struct LocalHandle {
    spec: CollectionSpec,
    cluster: Arc<LocalCluster>,
    collection: Mutex<Option<Arc<Collection>>>,
}

impl LocalHandle {
    pub fn new(cluster: Arc<LocalCluster>, collection: Arc<Collection>) -> Self {
        Self {
            spec: collection.spec().clone(),
            cluster,
            collection: Mutex::new(Some(collection)),
        }
    }

    pub fn cluster(&self) -> &Arc<LocalCluster> {
        &self.cluster
    }

    pub fn is_closed(&self) -> bool {
        self.collection.lock().is_none()
    }

    fn collection(&self) -> Result<Arc<Collection>> {
        self.collection.lock().clone().ok_or(StoreError::HandleClosed)
    }
}

#[async_trait]
impl DocumentStore for LocalHandle {
    fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    async fn upsert(&self, docs: &[Document]) -> Result<()> {
        let coll = self.collection()?;
        let docs = docs.to_vec();
        blocking(move || coll.upsert(&docs)).await
    }

    async fn replace_existing(&self, docs: &[Document]) -> Result<Vec<bool>> {
        let coll = self.collection()?;
        let docs = docs.to_vec();
        blocking(move || coll.replace_existing(&docs)).await
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Option<Document>>> {
        Ok(self.collection()?.get(ids))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let coll = self.collection()?;
        let ids = ids.to_vec();
        blocking(move || coll.delete(&ids)).await
    }

    async fn vector_search(
        &self,
        query: &[f32],
        k: Option<usize>,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RawHit>> {
        self.collection()?.search(query, k, filter)
    }

    async fn scan(&self, filter: Option<&FilterExpr>) -> Result<Vec<Document>> {
        Ok(self.collection()?.scan(filter))
    }

    async fn clear(&self) -> Result<()> {
        let coll = self.collection()?;
        blocking(move || coll.clear()).await
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.collection()?.count())
    }

    async fn flush(&self) -> Result<()> {
        self.collection()?.flush()
    }

    fn close(&self) -> Result<()> {
        let taken = self.collection.lock().take();
        match taken {
            Some(coll) => {
                tracing::debug!(index_name = %self.spec.index_name, "closing local store handle");
                coll.flush()
            }
            None => Ok(()),
        }
    }
}
