//! A persisted collection: documents, their embeddings and the identity the
//! collection was created with.
//!
//! On disk a collection is a directory holding three files, each replaced
//! atomically on every write:
//!
//! - `collection.json`: the [`CollectionSpec`], creation time and label counter
//! - `documents.json`: documents without embeddings, keyed by label
//! - `embeddings.bin`: the flat index in its binary form
//!
//! All state sits behind one lock, so a reader sees the collection either
//! before or after any single store call. Writes are applied to a copy of
//! the state, persisted, and only then published; a failed write leaves
//! both memory and disk as they were.
//!
//! An open collection holds an exclusive advisory lock on
//! `collection.lock`, so a second process cannot attach to the same
//! directory and overwrite its files.

use chrono::{DateTime, Utc};
use di_core::{CollectionSpec, Document, FilterExpr};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::eval;
use super::file_store::FileStore;
use super::flat::FlatIndex;
use crate::backend::RawHit;
use crate::error::{Result, StoreError};

const META_FILE: &str = "collection.json";
const DOCS_FILE: &str = "documents.json";
const VECTORS_FILE: &str = "embeddings.bin";
const LOCK_FILE: &str = "collection.lock";

const LOCK_ATTEMPTS: u32 = 20;
const LOCK_RETRY: Duration = Duration::from_millis(25);

/// Take the directory lock. Retries briefly: a collection released by the
/// last handle in this process may still be closing.
fn lock_dir(dir: &Path) -> Result<File> {
    let path = dir.join(LOCK_FILE);
    let file = OpenOptions::new().create(true).truncate(false).write(true).open(&path)?;
    let contended = fs2::lock_contended_error().raw_os_error();
    for attempt in 1..=LOCK_ATTEMPTS {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(e) if e.raw_os_error() == contended => {
                if attempt < LOCK_ATTEMPTS {
                    std::thread::sleep(LOCK_RETRY);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::Locked { path: dir.display().to_string() })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMeta {
    spec: CollectionSpec,
    created_at: DateTime<Utc>,
    next_label: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    label: u64,
    document: Document,
}

#[derive(Clone)]
struct State {
    /// Documents without embeddings, in insertion order.
    records: BTreeMap<u64, Document>,
    labels: HashMap<String, u64>,
    index: FlatIndex,
    next_label: u64,
}

impl State {
    fn empty(spec: &CollectionSpec) -> Self {
        Self {
            records: BTreeMap::new(),
            labels: HashMap::new(),
            index: FlatIndex::new(spec.n_dim, spec.distance),
            next_label: 1,
        }
    }

    fn assemble(&self, label: u64) -> Option<Document> {
        self.records.get(&label).map(|doc| {
            let mut doc = doc.clone();
            doc.embedding = self.index.get(label).map(<[f32]>::to_vec);
            doc
        })
    }

    /// Store `doc` under `label`, splitting the embedding into the index.
    fn put(&mut self, label: u64, doc: &Document) -> Result<()> {
        match doc.embedding {
            Some(ref e) => self.index.insert(label, e)?,
            None => {
                self.index.remove(label);
            }
        }
        let mut stored = doc.without_matches();
        stored.embedding = None;
        self.records.insert(label, stored);
        self.labels.insert(doc.id.clone(), label);
        Ok(())
    }
}

/// A Collection manages documents and their embeddings with exact
/// vector search.
pub struct Collection {
    spec: CollectionSpec,
    created_at: DateTime<Utc>,
    files: FileStore,
    state: RwLock<State>,
    _lock: File,
}

impl Collection {
    /// Create a new, empty collection in `dir` and persist its metadata.
    pub fn create(spec: CollectionSpec, dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let lock = lock_dir(&dir)?;
        let coll = Self {
            state: RwLock::new(State::empty(&spec)),
            spec,
            created_at: Utc::now(),
            files: FileStore::new(dir),
            _lock: lock,
        };
        coll.persist(&coll.state.read())?;
        tracing::debug!(index_name = %coll.spec.index_name, "created collection");
        Ok(coll)
    }

    /// Load the collection persisted in `dir`. `Ok(None)` if there is none.
    pub fn open(dir: PathBuf) -> Result<Option<Self>> {
        let files = FileStore::new(dir);
        if !files.exists(META_FILE) {
            return Ok(None);
        }
        let lock = lock_dir(files.base_path())?;
        let Some(meta_bytes) = files.get(META_FILE)? else {
            return Ok(None);
        };
        let corrupt = |file: &str, reason: String| StoreError::Corrupt {
            path: files.base_path().join(file).display().to_string(),
            reason,
        };
        let meta: CollectionMeta =
            serde_json::from_slice(&meta_bytes).map_err(|e| corrupt(META_FILE, e.to_string()))?;

        let records: Vec<StoredRecord> = match files.get(DOCS_FILE)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| corrupt(DOCS_FILE, e.to_string()))?,
            None => Vec::new(),
        };
        let mut index = match files.get(VECTORS_FILE)? {
            Some(bytes) => FlatIndex::from_bytes(&bytes, meta.spec.distance)
                .map_err(|e| corrupt(VECTORS_FILE, e.to_string()))?,
            None => FlatIndex::new(meta.spec.n_dim, meta.spec.distance),
        };
        if !index.is_empty() && index.dimension() != meta.spec.n_dim {
            return Err(corrupt(
                VECTORS_FILE,
                format!("dimension {} does not match n_dim {}", index.dimension(), meta.spec.n_dim),
            ));
        }
        if index.is_empty() {
            index = FlatIndex::new(meta.spec.n_dim, meta.spec.distance);
        }

        let mut state = State {
            records: BTreeMap::new(),
            labels: HashMap::new(),
            index,
            next_label: meta.next_label,
        };
        for r in records {
            state.next_label = state.next_label.max(r.label + 1);
            state.labels.insert(r.document.id.clone(), r.label);
            state.records.insert(r.label, r.document);
        }
        // Embeddings written before a crash cut off the documents file.
        let orphans: Vec<u64> = state
            .index
            .labels()
            .iter()
            .copied()
            .filter(|l| !state.records.contains_key(l))
            .collect();
        for label in orphans {
            state.index.remove(label);
        }

        tracing::debug!(
            index_name = %meta.spec.index_name,
            documents = state.records.len(),
            "loaded collection"
        );
        Ok(Some(Self {
            spec: meta.spec,
            created_at: meta.created_at,
            files,
            state: RwLock::new(state),
            _lock: lock,
        }))
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Embedding lengths must match and no value may be NaN or infinite:
    /// such values neither score nor survive a JSON round trip.
    fn check_documents(&self, docs: &[Document]) -> Result<()> {
        for doc in docs {
            if let Some(ref e) = doc.embedding {
                if e.len() != self.spec.n_dim {
                    return Err(StoreError::DimensionMismatch { expected: self.spec.n_dim, got: e.len() });
                }
            }
            if let Some(field) = doc.non_finite_field() {
                return Err(StoreError::InvalidDocument(format!(
                    "document '{}' has a non-finite {field}",
                    doc.id
                )));
            }
        }
        Ok(())
    }

    /// Run `f` on a copy of the state. If it reports a change, persist the
    /// copy and publish it; otherwise drop it.
    fn commit<T>(&self, f: impl FnOnce(&mut State) -> Result<(T, bool)>) -> Result<T> {
        let mut state = self.state.write();
        let mut staged = state.clone();
        let (out, changed) = f(&mut staged)?;
        if changed {
            self.persist(&staged)?;
            *state = staged;
        }
        Ok(out)
    }

    /// Create or overwrite documents by id.
    pub fn upsert(&self, docs: &[Document]) -> Result<()> {
        self.check_documents(docs)?;
        self.commit(|state| {
            for doc in docs {
                let existing = state.labels.get(&doc.id).copied();
                let label = match existing {
                    Some(label) => label,
                    None => {
                        let label = state.next_label;
                        state.next_label += 1;
                        label
                    }
                };
                state.put(label, doc)?;
            }
            Ok(((), !docs.is_empty()))
        })
    }

    /// Overwrite documents whose id exists; report which ones did.
    pub fn replace_existing(&self, docs: &[Document]) -> Result<Vec<bool>> {
        self.check_documents(docs)?;
        self.commit(|state| {
            let mut replaced = Vec::with_capacity(docs.len());
            for doc in docs {
                match state.labels.get(&doc.id).copied() {
                    Some(label) => {
                        state.put(label, doc)?;
                        replaced.push(true);
                    }
                    None => replaced.push(false),
                }
            }
            let changed = replaced.iter().any(|r| *r);
            Ok((replaced, changed))
        })
    }

    pub fn get(&self, ids: &[String]) -> Vec<Option<Document>> {
        let state = self.state.read();
        ids.iter()
            .map(|id| state.labels.get(id).and_then(|&label| state.assemble(label)))
            .collect()
    }

    /// Delete documents by id, ignoring absent ones.
    pub fn delete(&self, ids: &[String]) -> Result<usize> {
        self.commit(|state| {
            let mut removed = 0;
            for id in ids {
                if let Some(label) = state.labels.remove(id) {
                    state.records.remove(&label);
                    state.index.remove(label);
                    removed += 1;
                }
            }
            Ok((removed, removed > 0))
        })
    }

    /// Nearest documents to `query` passing `filter`, closest first.
    pub fn search(&self, query: &[f32], k: Option<usize>, filter: Option<&FilterExpr>) -> Result<Vec<RawHit>> {
        if query.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::InvalidDocument("query embedding has a non-finite component".into()));
        }
        let state = self.state.read();
        let accept = |label: u64| match filter {
            None => true,
            Some(f) => state.records.get(&label).map_or(false, |doc| eval::matches(f, doc, &self.spec)),
        };
        let nearest = state.index.search(query, k, accept)?;
        Ok(nearest
            .into_iter()
            .filter_map(|(label, distance)| state.assemble(label).map(|document| RawHit { document, distance }))
            .collect())
    }

    /// Documents passing `filter` in insertion order.
    pub fn scan(&self, filter: Option<&FilterExpr>) -> Vec<Document> {
        let state = self.state.read();
        state
            .records
            .iter()
            .filter(|(_, doc)| filter.map_or(true, |f| eval::matches(f, doc, &self.spec)))
            .filter_map(|(&label, _)| state.assemble(label))
            .collect()
    }

    /// Delete all documents; the identity stays.
    pub fn clear(&self) -> Result<()> {
        self.commit(|state| {
            let changed = !(state.records.is_empty() && state.index.is_empty());
            state.records.clear();
            state.labels.clear();
            state.index.clear();
            Ok(((), changed))
        })
    }

    /// Get document count.
    pub fn count(&self) -> usize {
        self.state.read().records.len()
    }

    /// Writes are persisted before they are published, so nothing is ever
    /// pending.
    pub fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn persist(&self, state: &State) -> Result<()> {
        let mut vectors = Vec::new();
        state.index.write_to(&mut vectors)?;
        self.files.put(VECTORS_FILE, &vectors)?;

        let records: Vec<StoredRecord> = state
            .records
            .iter()
            .map(|(&label, doc)| StoredRecord { label, document: doc.clone() })
            .collect();
        let docs_bytes = serde_json::to_vec(&records).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.files.put(DOCS_FILE, &docs_bytes)?;

        let meta = CollectionMeta {
            spec: self.spec.clone(),
            created_at: self.created_at,
            next_label: state.next_label,
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.files.put(META_FILE, &meta_bytes)?;
        Ok(())
    }
}
