//! Per-namespace approximate nearest-neighbor indexes over document
//! embeddings, rebuildable from the durable record store.

pub mod error;
pub mod registry;

pub use error::IndexError;
pub use registry::{IndexConfig, IndexRegistry, RebuildStats};
