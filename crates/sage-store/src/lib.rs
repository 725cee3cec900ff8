//! SQLite-backed document record store with tenant-namespaced records.

pub mod error;
pub mod sqlite;
pub mod types;

pub use error::StoreError;
pub use sqlite::SqliteStore;
pub use types::{DocumentId, DocumentRecord, Namespace, NamespaceError};
