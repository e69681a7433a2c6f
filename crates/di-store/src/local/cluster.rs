//! A data directory holding collections, shared by every connection to it
//! within the process.

use di_core::CollectionSpec;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};

use super::collection::Collection;
use crate::error::{Result, StoreError};

fn registry() -> &'static Mutex<HashMap<PathBuf, Weak<LocalCluster>>> {
    static CLUSTERS: OnceLock<Mutex<HashMap<PathBuf, Weak<LocalCluster>>>> = OnceLock::new();
    CLUSTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// All collections under one root directory.
///
/// Collections are loaded on first attach and dropped from memory once the
/// last handle to them goes away; the next attach reloads them from disk.
pub struct LocalCluster {
    root: PathBuf,
    collections: Mutex<HashMap<String, Weak<Collection>>>,
}

impl LocalCluster {
    /// Attach to the cluster rooted at `root`, creating the directory if
    /// needed. Every attach to the same directory returns the same cluster
    /// while any handle to it is alive.
    pub fn attach(root: impl AsRef<Path>) -> Result<Arc<Self>> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;

        let mut clusters = registry().lock();
        if let Some(cluster) = clusters.get(&root).and_then(Weak::upgrade) {
            return Ok(cluster);
        }
        clusters.retain(|_, c| c.strong_count() > 0);
        let cluster = Arc::new(Self {
            root: root.clone(),
            collections: Mutex::new(HashMap::new()),
        });
        clusters.insert(root, Arc::downgrade(&cluster));
        tracing::debug!(root = %cluster.root.display(), "attached local cluster");
        Ok(cluster)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open the collection named by `spec`, creating it on first use.
    ///
    /// Reattaching with a different dimensionality, metric or column set
    /// fails instead of silently serving the persisted schema.
    pub fn open_collection(&self, spec: &CollectionSpec) -> Result<Arc<Collection>> {
        validate_name(&spec.index_name)?;
        let mut colls = self.collections.lock();
        let coll = match colls.get(&spec.index_name).and_then(Weak::upgrade) {
            Some(coll) => coll,
            None => {
                let dir = self.root.join(&spec.index_name);
                let coll = match Collection::open(dir.clone())? {
                    Some(coll) => coll,
                    None => Collection::create(spec.clone(), dir)?,
                };
                let coll = Arc::new(coll);
                colls.retain(|_, c| c.strong_count() > 0);
                colls.insert(spec.index_name.clone(), Arc::downgrade(&coll));
                coll
            }
        };
        if let Some((field, persisted, requested)) = spec.identity_conflict(coll.spec()) {
            return Err(StoreError::CollectionMismatch {
                index_name: spec.index_name.clone(),
                field,
                persisted,
                requested,
            });
        }
        Ok(coll)
    }

    pub fn has_collection(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.root.join(name).join("collection.json").exists()
    }

    /// Names of the collections persisted under the root.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.has_collection(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
