use di_core::{IndexerError, Result};
use di_store::DocumentStore;

/// Owns a store handle and closes it when dropped.
///
/// [`StoreGuard::release`] closes explicitly and surfaces the error; a guard
/// dropped without release closes on `Drop` and can only log a failure.
pub struct StoreGuard {
    store: Option<Box<dyn DocumentStore>>,
}

impl StoreGuard {
    pub fn new(store: Box<dyn DocumentStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn get(&self) -> Result<&dyn DocumentStore> {
        self.store.as_deref().ok_or(IndexerError::Closed)
    }

    pub fn release(mut self) -> Result<()> {
        match self.store.take() {
            Some(store) => store.close().map_err(IndexerError::from),
            None => Ok(()),
        }
    }
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            if let Err(e) = store.close() {
                tracing::error!(
                    index_name = %store.spec().index_name,
                    error = %e,
                    "failed to release store handle"
                );
            }
        }
    }
}
