//! Tenant-namespaced ingestion and retrieval-augmented query pipeline.
//!
//! The durable record store is the source of truth; per-namespace ANN
//! indexes are a derived cache rebuilt from it at startup. Conversation
//! state is process-lifetime only.

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod extract;

pub use config::Config;
pub use conversation::ConversationStore;
pub use engine::{Engine, RebuildReport};
pub use error::EngineError;
pub use sage_index::IndexConfig;
