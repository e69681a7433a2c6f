use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{IndexerError, Result};
use crate::filter::{ColumnDef, FilterExpr};
use crate::metric::Metric;
use crate::policy::QueryPolicy;

/// Construction options of an index facade. Immutable once the facade is
/// open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Connection targets of the backing store, tried in order.
    pub hosts: Vec<String>,
    pub n_dim: usize,
    pub distance: Metric,
    pub index_name: String,
    /// Default query policy merged into every search.
    pub match_args: QueryPolicy,
    pub columns: Vec<ColumnDef>,
    pub index_text: bool,
    /// Tag keys searched by text filters.
    pub tag_indices: Vec<String>,
    /// Number of documents per store write.
    pub batch_size: usize,
    pub ef_construction: Option<usize>,
    pub m: Option<usize>,
    /// Backend-specific options, passed to the connector untouched.
    pub store_options: Map<String, Value>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["file://.docindex".into()],
            n_dim: 128,
            distance: Metric::Cosine,
            index_name: "Persisted".into(),
            match_args: QueryPolicy::default(),
            columns: Vec::new(),
            index_text: false,
            tag_indices: Vec::new(),
            batch_size: 64,
            ef_construction: None,
            m: None,
            store_options: Map::new(),
        }
    }
}

impl IndexerConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        tracing::debug!(index_name = %config.index_name, n_dim = config.n_dim, "loaded indexer config");
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(IndexerError::InvalidConfig("hosts must not be empty".into()));
        }
        if self.n_dim == 0 {
            return Err(IndexerError::InvalidConfig("n_dim must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(IndexerError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.index_name.trim().is_empty() {
            return Err(IndexerError::InvalidConfig("index_name must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.name.as_str()) {
                return Err(IndexerError::InvalidConfig(format!("column '{}' declared twice", c.name)));
            }
        }
        if let Some(ref filter) = self.match_args.filter {
            self.validate_filter(filter)?;
        }
        Ok(())
    }

    /// Whether text filters have anything to search.
    pub fn text_search_enabled(&self) -> bool {
        self.index_text || !self.tag_indices.is_empty()
    }

    pub fn validate_filter(&self, filter: &FilterExpr) -> Result<()> {
        filter.validate(&self.columns, self.text_search_enabled())
    }

    /// Identity and schema of the collection this config attaches to.
    pub fn collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            index_name: self.index_name.clone(),
            n_dim: self.n_dim,
            distance: self.distance,
            columns: self.columns.clone(),
            index_text: self.index_text,
            tag_indices: self.tag_indices.clone(),
            ef_construction: self.ef_construction,
            m: self.m,
        }
    }
}

/// What a store needs to create or reattach to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub index_name: String,
    pub n_dim: usize,
    pub distance: Metric,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub index_text: bool,
    #[serde(default)]
    pub tag_indices: Vec<String>,
    #[serde(default)]
    pub ef_construction: Option<usize>,
    #[serde(default)]
    pub m: Option<usize>,
}

impl CollectionSpec {
    /// Compare the identity-defining fields with an already persisted spec.
    /// Text-indexing settings count: filters are evaluated against the
    /// persisted ones.
    /// Returns the first differing field as `(name, persisted, requested)`.
    pub fn identity_conflict(&self, persisted: &CollectionSpec) -> Option<(&'static str, String, String)> {
        if self.n_dim != persisted.n_dim {
            return Some(("n_dim", persisted.n_dim.to_string(), self.n_dim.to_string()));
        }
        if self.distance != persisted.distance {
            return Some(("distance", persisted.distance.to_string(), self.distance.to_string()));
        }
        let mut mine = self.columns.clone();
        let mut theirs = persisted.columns.clone();
        mine.sort();
        theirs.sort();
        if mine != theirs {
            return Some(("columns", describe_columns(&theirs), describe_columns(&mine)));
        }
        if self.index_text != persisted.index_text {
            return Some(("index_text", persisted.index_text.to_string(), self.index_text.to_string()));
        }
        let mut mine = self.tag_indices.clone();
        let mut theirs = persisted.tag_indices.clone();
        mine.sort();
        theirs.sort();
        if mine != theirs {
            return Some(("tag_indices", format!("[{}]", theirs.join(", ")), format!("[{}]", mine.join(", "))));
        }
        None
    }

    pub fn text_search_enabled(&self) -> bool {
        self.index_text || !self.tag_indices.is_empty()
    }
}

fn describe_columns(columns: &[ColumnDef]) -> String {
    let parts: Vec<String> = columns.iter().map(|c| format!("{}:{}", c.name, c.column_type)).collect();
    format!("[{}]", parts.join(", "))
}
