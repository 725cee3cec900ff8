use sage_index::IndexError;
use sage_llm::LlmError;
use sage_store::{NamespaceError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidIdentifier(#[from] NamespaceError),

    #[error("empty document")]
    EmptyDocument,

    #[error("empty prompt")]
    EmptyPrompt,

    #[error("embedding failed: {0}")]
    EmbeddingFailed(#[source] LlmError),

    #[error("no knowledge base for namespace")]
    NoKnowledgeBase,

    #[error("no relevant context")]
    NoRelevantContext,

    #[error("session not found")]
    SessionNotFound,

    #[error("completion failed: {0}")]
    CompletionFailed(#[source] LlmError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}
