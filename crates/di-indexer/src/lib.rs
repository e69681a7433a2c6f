//! docindex: vector search and metadata filtering over a persistent
//! document collection.
//!
//! [`IndexFacade`] exposes the operations `index`, `search`, `update`,
//! `delete`, `filter`, `fill_embedding` and `clear`, either called directly
//! or routed from a [`Request`] by [`IndexFacade::dispatch`].

pub mod facade;
pub mod guard;
pub mod report;
pub mod request;

pub use facade::IndexFacade;
pub use guard::StoreGuard;
pub use report::UpdateReport;
pub use request::{Operation, Request, Response};

pub use di_core::{
    ColumnDef, ColumnType, Content, Document, FilterExpr, IndexerConfig, IndexerError, Match, Metric,
    QueryPolicy, Result, TagValue,
};
