//! Document stores backing the docindex facade.
//!
//! The facade talks to stores only through [`DocumentStore`] and
//! [`StoreConnector`]. The bundled [`local`] backend keeps collections in
//! process memory with write-through persistence to a data directory.

pub mod backend;
pub mod distance;
pub mod error;
pub mod local;

pub use backend::{DocumentStore, RawHit, StoreConnector};
pub use error::{Result, StoreError};
pub use local::{LocalCluster, LocalConnector, LocalHandle};
