//! Request-style access to the facade: an endpoint name, documents and a
//! parameters map in, a [`Response`] out.

use di_core::{Document, IndexerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::report::UpdateReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Index,
    Search,
    Update,
    Delete,
    Filter,
    FillEmbedding,
    Clear,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Index,
        Operation::Search,
        Operation::Update,
        Operation::Delete,
        Operation::Filter,
        Operation::FillEmbedding,
        Operation::Clear,
    ];

    pub fn endpoint(self) -> &'static str {
        match self {
            Operation::Index => "/index",
            Operation::Search => "/search",
            Operation::Update => "/update",
            Operation::Delete => "/delete",
            Operation::Filter => "/filter",
            Operation::FillEmbedding => "/fill_embedding",
            Operation::Clear => "/clear",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Endpoint names are matched with or without a leading slash.
impl FromStr for Operation {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().trim_start_matches('/');
        Operation::ALL
            .into_iter()
            .find(|op| &op.endpoint()[1..] == name)
            .ok_or_else(|| IndexerError::invalid_request(format!("unknown endpoint '{s}'")))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub endpoint: String,
    pub docs: Vec<Document>,
    pub parameters: Map<String, Value>,
}

impl Request {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Default::default() }
    }

    pub fn docs(mut self, docs: Vec<Document>) -> Self {
        self.docs = docs;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Response {
    Empty,
    Documents(Vec<Document>),
    Updated(UpdateReport),
}

impl Response {
    pub fn documents(&self) -> Option<&[Document]> {
        match self {
            Response::Documents(docs) => Some(docs),
            _ => None,
        }
    }

    pub fn into_documents(self) -> Option<Vec<Document>> {
        match self {
            Response::Documents(docs) => Some(docs),
            _ => None,
        }
    }
}

/// `ids` from delete parameters. Absent or null means nothing to delete.
pub(crate) fn ids_param(parameters: &Map<String, Value>) -> Result<Vec<String>> {
    match parameters.get("ids") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| IndexerError::invalid_request(format!("ids must be strings, got {v}")))
            })
            .collect(),
        Some(other) => Err(IndexerError::invalid_request(format!("ids must be a list, got {other}"))),
    }
}

/// The filter expression of a filter request. `query` is accepted as an
/// older name for `filter`.
pub(crate) fn filter_param(parameters: &Map<String, Value>) -> Result<&Value> {
    ["filter", "query"]
        .iter()
        .filter_map(|k| parameters.get(*k))
        .find(|v| !v.is_null())
        .ok_or_else(|| IndexerError::invalid_request("filter requires a 'filter' parameter"))
}
