//! Shared model of the document index: documents, configuration, query
//! policy, filter expressions and the error taxonomy.

pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod metric;
pub mod policy;

pub use config::{CollectionSpec, IndexerConfig};
pub use document::{Content, Document, Match, TagValue};
pub use error::{IndexerError, Result};
pub use filter::{ColumnDef, ColumnType, FilterExpr, NumericRange};
pub use metric::Metric;
pub use policy::QueryPolicy;
