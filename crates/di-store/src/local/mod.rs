//! In-process, file-persisted document store.
//!
//! Hosts are `file://<dir>` URIs or bare directory paths. Every connection
//! to the same directory shares one [`LocalCluster`], so independent facades
//! configured with the same host and index name see the same collection.

mod cluster;
mod collection;
mod eval;
mod file_store;
mod flat;
mod handle;

pub use cluster::LocalCluster;
pub use collection::Collection;
pub use eval::{matches, tokenize};
pub use file_store::FileStore;
pub use flat::FlatIndex;
pub use handle::LocalHandle;

use async_trait::async_trait;
use di_core::CollectionSpec;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::backend::{DocumentStore, StoreConnector};
use crate::error::{Result, StoreError};

/// Map a configured host onto a data directory.
pub fn resolve_host(host: &str) -> Result<PathBuf> {
    let host = host.trim();
    if let Some(path) = host.strip_prefix("file://") {
        if path.is_empty() {
            return Err(StoreError::UnsupportedHost(host.to_string()));
        }
        return Ok(PathBuf::from(path));
    }
    if host.is_empty() || host.contains("://") {
        return Err(StoreError::UnsupportedHost(host.to_string()));
    }
    Ok(PathBuf::from(host))
}

/// Connects to local clusters. Hosts are tried in order; the first one that
/// can be attached serves the collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

impl LocalConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreConnector for LocalConnector {
    async fn connect(
        &self,
        hosts: &[String],
        spec: &CollectionSpec,
        options: &Map<String, Value>,
    ) -> Result<Box<dyn DocumentStore>> {
        for key in options.keys() {
            tracing::debug!(option = %key, "local store ignores option");
        }
        let mut failures = Vec::new();
        for host in hosts {
            match resolve_host(host).and_then(LocalCluster::attach) {
                Ok(cluster) => {
                    let collection = cluster.open_collection(spec)?;
                    tracing::debug!(host = %host, index_name = %spec.index_name, "connected to local store");
                    return Ok(Box::new(LocalHandle::new(cluster, collection)));
                }
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "store host unreachable");
                    failures.push(format!("{host}: {e}"));
                }
            }
        }
        if failures.is_empty() {
            failures.push("no hosts configured".to_string());
        }
        Err(StoreError::Unreachable(failures.join("; ")))
    }
}
