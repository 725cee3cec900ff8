use sage_index::{IndexConfig, IndexError, IndexRegistry};
use sage_llm::LlmError;
use sage_llm::provider::{LlmProvider, Message, Role};
use sage_store::{DocumentId, Namespace, SqliteStore};

use crate::conversation::ConversationStore;
use crate::error::EngineError;

pub use sage_index::RebuildStats as RebuildReport;

/// Delimiter between retrieved documents in the grounding context.
const CONTEXT_DELIMITER: &str = "\n---\n";

/// Namespace-aware ingestion and retrieval-augmented query pipeline.
///
/// Owns the durable record store, the derived per-namespace ANN indexes, and
/// process-lifetime conversation state. All methods take `&self`; per-tenant
/// locking lives inside the index registry and conversation store, so
/// unrelated namespaces never contend.
pub struct Engine<P> {
    provider: P,
    store: SqliteStore,
    indexes: IndexRegistry,
    conversations: ConversationStore,
    top_k: usize,
}

impl<P> std::fmt::Debug for Engine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("indexes", &self.indexes)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> Engine<P> {
    #[must_use]
    pub fn new(provider: P, store: SqliteStore, index_config: IndexConfig, top_k: usize) -> Self {
        Self {
            provider,
            store,
            indexes: IndexRegistry::new(index_config),
            conversations: ConversationStore::new(),
            top_k: top_k.max(1),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.indexes.dimension()
    }

    /// Access the underlying record store for operations that don't involve
    /// retrieval.
    #[must_use]
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Rebuild every namespace's index from a full store scan, replacing all
    /// in-memory index state. Run at startup and safe to re-run at any time;
    /// this is also what repairs documents left durable-but-unsearchable by a
    /// failed index append.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan or the rebuild fails.
    pub async fn rebuild(&self) -> Result<RebuildReport, EngineError> {
        let records = self.store.scan_all().await?;
        let stats = self.indexes.rebuild_all(&records)?;
        tracing::info!(
            namespaces = stats.namespaces,
            vectors = stats.vectors,
            skipped = stats.skipped,
            "index rebuild complete"
        );
        Ok(stats)
    }

    /// Ingest a document into a namespace's knowledge base.
    ///
    /// The record store write happens first; the index append follows under
    /// the namespace lock. If the append fails the document is durable but
    /// not yet searchable, and the insert is not rolled back; the divergence
    /// is repaired by the next [`Engine::rebuild`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyDocument`] for blank text and
    /// [`EngineError::EmbeddingFailed`] (with no store mutation) if the
    /// embedding client fails or returns a vector of the wrong dimension.
    pub async fn ingest(&self, namespace: &Namespace, text: &str) -> Result<DocumentId, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyDocument);
        }
        let embedding = self
            .provider
            .embed(text)
            .await
            .map_err(EngineError::EmbeddingFailed)?;
        self.check_dimension(&embedding)?;

        let id = self.store.insert(namespace, text, &embedding).await?;
        if let Err(e) = self.indexes.append(namespace, id, &embedding) {
            tracing::warn!(
                document = %id,
                namespace = %namespace,
                error = %e,
                "index append failed after durable insert; document unsearchable until rebuild"
            );
            return Err(EngineError::Index(e));
        }
        tracing::debug!(document = %id, namespace = %namespace, "document ingested");
        Ok(id)
    }

    /// Delete a namespace's documents and reset its in-memory index.
    ///
    /// Callers wanting "latest corpus only" purge and then re-ingest; `ingest`
    /// itself never deletes on their behalf.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete or index reset fails.
    pub async fn purge(&self, namespace: &Namespace) -> Result<u64, EngineError> {
        let removed = self.store.delete_namespace(namespace).await?;
        self.indexes.reset(namespace)?;
        tracing::info!(namespace = %namespace, removed, "namespace purged");
        Ok(removed)
    }

    /// Ensure an empty index exists for a namespace without ingesting.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be created.
    pub fn ensure_knowledge_base(&self, namespace: &Namespace) -> Result<(), EngineError> {
        self.indexes.get_or_create(namespace)?;
        Ok(())
    }

    /// Create (or replace) a conversation for (namespace, session) with a
    /// single system turn.
    pub fn create_session(&self, namespace: &Namespace, session: &str, system_prompt: &str) {
        self.conversations.create(namespace, session, system_prompt);
    }

    /// # Errors
    ///
    /// Returns [`EngineError::SessionNotFound`] if the session is absent.
    pub fn delete_session(&self, namespace: &Namespace, session: &str) -> Result<(), EngineError> {
        self.conversations.delete(namespace, session)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::SessionNotFound`] if the session is absent.
    pub fn transcript(&self, namespace: &Namespace, session: &str) -> Result<Vec<Message>, EngineError> {
        self.conversations.snapshot(namespace, session)
    }

    #[must_use]
    pub fn session_exists(&self, namespace: &Namespace, session: &str) -> bool {
        self.conversations.exists(namespace, session)
    }

    /// Retrieve the nearest documents for a query text, nearest first.
    ///
    /// Ids that no longer resolve in the record store (deleted concurrently)
    /// are skipped. An existing-but-empty knowledge base yields an empty
    /// list, not an error.
    ///
    /// # Errors
    ///
    /// `EmptyPrompt` for a blank query; `EmbeddingFailed` if the query cannot
    /// be embedded; `NoKnowledgeBase` when the namespace has no index.
    pub async fn retrieve(
        &self,
        namespace: &Namespace,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<sage_store::DocumentRecord>, EngineError> {
        if query_text.trim().is_empty() {
            return Err(EngineError::EmptyPrompt);
        }
        let embedding = self
            .provider
            .embed(query_text)
            .await
            .map_err(EngineError::EmbeddingFailed)?;
        self.check_dimension(&embedding)?;

        let ids = match self.indexes.search(namespace, &embedding, k) {
            Ok(ids) => ids,
            Err(IndexError::NamespaceNotFound) => return Err(EngineError::NoKnowledgeBase),
            Err(e) => return Err(EngineError::Index(e)),
        };

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get(id).await? {
                Some(record) => records.push(record),
                None => tracing::debug!(document = %id, "retrieved id no longer resolves, skipping"),
            }
        }
        Ok(records)
    }

    /// Answer a user utterance grounded in the namespace's knowledge base.
    ///
    /// Retrieval runs before any transcript mutation; a failed completion
    /// leaves the user turn appended with no assistant turn, so the question
    /// can be retried without resubmitting it.
    ///
    /// # Errors
    ///
    /// `EmptyPrompt` for a blank utterance; `EmbeddingFailed` if the
    /// utterance cannot be embedded; `NoKnowledgeBase` when the namespace has
    /// no index; `NoRelevantContext` when the index is empty or no retrieved
    /// id resolves; `SessionNotFound` when the session was never created;
    /// `CompletionFailed` on provider error.
    pub async fn query(
        &self,
        namespace: &Namespace,
        session: &str,
        utterance: &str,
    ) -> Result<String, EngineError> {
        let records = self.retrieve(namespace, utterance, self.top_k).await?;
        if records.is_empty() {
            return Err(EngineError::NoRelevantContext);
        }
        let context = records
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_DELIMITER);

        self.conversations
            .append(namespace, session, Role::User, utterance)?;

        let mut messages = self.conversations.snapshot(namespace, session)?;
        if let Some(last) = messages.last_mut() {
            last.content = grounded_prompt(&context, utterance);
        }

        let reply = self
            .provider
            .chat(&messages)
            .await
            .map_err(EngineError::CompletionFailed)?;

        self.conversations
            .append(namespace, session, Role::Assistant, &reply)?;
        Ok(reply)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EngineError> {
        let expected = self.dimension();
        if embedding.len() == expected {
            Ok(())
        } else {
            Err(EngineError::EmbeddingFailed(LlmError::Other(format!(
                "provider returned a {}-dimension vector, expected {expected}",
                embedding.len()
            ))))
        }
    }
}

fn grounded_prompt(context: &str, utterance: &str) -> String {
    let mut prompt = String::from(
        "Answer the question using the reference material below. \
         If the material does not cover the question, say so.\n\nReference material:\n",
    );
    prompt.push_str(context);
    prompt.push_str("\n\nQuestion:\n");
    prompt.push_str(utterance);
    prompt
}
