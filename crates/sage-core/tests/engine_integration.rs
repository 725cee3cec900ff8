use std::sync::Arc;

use sage_core::engine::Engine;
use sage_core::error::EngineError;
use sage_core::IndexConfig;
use sage_llm::mock::MockProvider;
use sage_llm::provider::Role;
use sage_store::{Namespace, SqliteStore};

const TEST_DIMENSION: usize = 8;

fn test_index_config() -> IndexConfig {
    IndexConfig {
        dimension: TEST_DIMENSION,
        ..IndexConfig::default()
    }
}

async fn test_engine(provider: MockProvider) -> Engine<MockProvider> {
    let store = SqliteStore::new(":memory:").await.unwrap();
    Engine::new(provider, store, test_index_config(), 5)
}

fn ns(owner: &str, agent: &str) -> Namespace {
    Namespace::resolve(owner, agent, None).unwrap()
}

#[tokio::test]
async fn ingest_then_self_retrieve() {
    let engine = test_engine(MockProvider::default()).await;
    let namespace = ns("alice", "tutor");

    engine.ingest(&namespace, "Water boils at 100C.").await.unwrap();
    let id = engine.ingest(&namespace, "The sky is blue.").await.unwrap();

    let records = engine
        .retrieve(&namespace, "The sky is blue.", 1)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].text, "The sky is blue.");
}

#[tokio::test]
async fn retrieve_unknown_namespace_is_no_knowledge_base() {
    let engine = test_engine(MockProvider::default()).await;
    let result = engine.retrieve(&ns("alice", "tutor"), "anything", 5).await;
    assert!(matches!(result, Err(EngineError::NoKnowledgeBase)));
}

#[tokio::test]
async fn empty_knowledge_base_retrieves_empty_list() {
    let engine = test_engine(MockProvider::default()).await;
    let namespace = ns("alice", "tutor");
    engine.ensure_knowledge_base(&namespace).unwrap();

    let records = engine.retrieve(&namespace, "anything", 5).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn query_empty_knowledge_base_is_no_relevant_context() {
    let engine = test_engine(MockProvider::default()).await;
    let namespace = ns("alice", "tutor");
    engine.ensure_knowledge_base(&namespace).unwrap();
    engine.create_session(&namespace, "s1", "prompt");

    let result = engine.query(&namespace, "s1", "anything").await;
    assert!(matches!(result, Err(EngineError::NoRelevantContext)));
}

#[tokio::test]
async fn ingest_rejects_blank_document() {
    let engine = test_engine(MockProvider::default()).await;
    let result = engine.ingest(&ns("alice", "tutor"), "   \n").await;
    assert!(matches!(result, Err(EngineError::EmptyDocument)));
}

#[tokio::test]
async fn query_rejects_blank_prompt() {
    let engine = test_engine(MockProvider::default()).await;
    let result = engine.query(&ns("alice", "tutor"), "s1", "  ").await;
    assert!(matches!(result, Err(EngineError::EmptyPrompt)));
}

#[tokio::test]
async fn embedding_failure_leaves_store_untouched() {
    let engine = test_engine(MockProvider::failing_embed()).await;
    let namespace = ns("alice", "tutor");

    let result = engine.ingest(&namespace, "some document").await;
    assert!(matches!(result, Err(EngineError::EmbeddingFailed(_))));

    let report = engine.rebuild().await.unwrap();
    assert_eq!(report.vectors, 0);
    assert_eq!(engine.store().count(&namespace).await.unwrap(), 0);
}

#[tokio::test]
async fn wrong_dimension_embedding_is_embedding_failure() {
    // Engine configured for 8 dimensions, provider answering with 16.
    let engine = test_engine(MockProvider::default().with_dimension(16)).await;
    let namespace = ns("alice", "tutor");

    let result = engine.ingest(&namespace, "some document").await;
    assert!(matches!(result, Err(EngineError::EmbeddingFailed(_))));
    assert_eq!(engine.store().count(&namespace).await.unwrap(), 0);
}

#[tokio::test]
async fn transcript_orders_system_user_assistant() {
    let provider = MockProvider::with_responses(vec!["b".into()]);
    let engine = test_engine(provider).await;
    let namespace = ns("alice", "tutor");

    engine.ingest(&namespace, "reference doc").await.unwrap();
    engine.create_session(&namespace, "s1", "sys");
    engine.query(&namespace, "s1", "a").await.unwrap();

    let transcript = engine.transcript(&namespace, "s1").unwrap();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[0].role, Role::System);
    assert_eq!(transcript[0].content, "sys");
    assert_eq!(transcript[1].role, Role::User);
    assert_eq!(transcript[1].content, "a");
    assert_eq!(transcript[2].role, Role::Assistant);
    assert_eq!(transcript[2].content, "b");
}

#[tokio::test]
async fn query_without_session_fails_after_retrieval() {
    let engine = test_engine(MockProvider::default()).await;
    let namespace = ns("alice", "tutor");
    engine.ingest(&namespace, "reference doc").await.unwrap();

    let result = engine.query(&namespace, "never-created", "question").await;
    assert!(matches!(result, Err(EngineError::SessionNotFound)));
}

#[tokio::test]
async fn failed_completion_keeps_user_turn_only() {
    let engine = test_engine(MockProvider::failing()).await;
    let namespace = ns("alice", "tutor");

    engine.ingest(&namespace, "reference doc").await.unwrap();
    engine.create_session(&namespace, "s1", "sys");

    let result = engine.query(&namespace, "s1", "unanswered question").await;
    assert!(matches!(result, Err(EngineError::CompletionFailed(_))));

    let transcript = engine.transcript(&namespace, "s1").unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].role, Role::User);
    assert_eq!(transcript[1].content, "unanswered question");
}

#[tokio::test]
async fn scenario_sky_and_water() {
    let engine = test_engine(MockProvider::default()).await;
    let namespace = ns("teacher", "physics-bot");

    engine.ingest(&namespace, "The sky is blue.").await.unwrap();
    engine
        .ingest(&namespace, "Water boils at 100C.")
        .await
        .unwrap();

    let nearest = engine
        .retrieve(&namespace, "What color is the sky?", 1)
        .await
        .unwrap();
    assert_eq!(nearest[0].text, "The sky is blue.");

    // An utterance unrelated to either document still retrieves the nearest
    // of the two; an empty result only means zero resolvable hits, never a
    // weak semantic match.
    let unrelated = engine
        .retrieve(&namespace, "parliamentary voting procedures", 1)
        .await
        .unwrap();
    assert_eq!(unrelated.len(), 1);

    engine.create_session(&namespace, "s1", "You are a science tutor.");
    let reply = engine
        .query(&namespace, "s1", "What color is the sky?")
        .await
        .unwrap();
    assert_eq!(reply, "mock response");
}

#[tokio::test]
async fn concurrent_ingests_into_one_namespace() {
    let engine = Arc::new(test_engine(MockProvider::default()).await);
    let namespace = ns("alice", "tutor");

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        let namespace = namespace.clone();
        handles.push(tokio::spawn(async move {
            engine
                .ingest(&namespace, &format!("document number {i}"))
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16, "every ingest produced a distinct id");

    // Index and id map stayed aligned: a rebuild from durable state indexes
    // exactly the same number of vectors the live index accepted.
    let report = engine.rebuild().await.unwrap();
    assert_eq!(report.namespaces, 1);
    assert_eq!(report.vectors, 16);

    let records = engine
        .retrieve(&namespace, "document number 3", 1)
        .await
        .unwrap();
    assert_eq!(records[0].text, "document number 3");
}

#[tokio::test]
async fn rebuild_is_idempotent() {
    let engine = test_engine(MockProvider::default()).await;
    let a = ns("alice", "tutor");
    let b = ns("bob", "coach");

    engine.ingest(&a, "alpha doc").await.unwrap();
    engine.ingest(&a, "beta doc").await.unwrap();
    engine.ingest(&b, "gamma doc").await.unwrap();

    let first = engine.rebuild().await.unwrap();
    let hits_first = engine.retrieve(&a, "alpha doc", 2).await.unwrap();

    let second = engine.rebuild().await.unwrap();
    let hits_second = engine.retrieve(&a, "alpha doc", 2).await.unwrap();

    assert_eq!(first.namespaces, second.namespaces);
    assert_eq!(first.vectors, second.vectors);
    let ids = |records: &[sage_store::DocumentRecord]| {
        records.iter().map(|r| r.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&hits_first), ids(&hits_second));
}

#[tokio::test]
async fn restart_rebuilds_from_durable_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sage.db");
    let path_str = path.to_str().unwrap();
    let namespace = ns("alice", "tutor");

    {
        let store = SqliteStore::new(path_str).await.unwrap();
        let engine = Engine::new(MockProvider::default(), store, test_index_config(), 5);
        engine.ingest(&namespace, "durable knowledge").await.unwrap();
    }

    // Fresh process: empty indexes until the startup rebuild runs.
    let store = SqliteStore::new(path_str).await.unwrap();
    let engine = Engine::new(MockProvider::default(), store, test_index_config(), 5);
    assert!(matches!(
        engine.retrieve(&namespace, "durable knowledge", 1).await,
        Err(EngineError::NoKnowledgeBase)
    ));

    let report = engine.rebuild().await.unwrap();
    assert_eq!(report.vectors, 1);
    let records = engine
        .retrieve(&namespace, "durable knowledge", 1)
        .await
        .unwrap();
    assert_eq!(records[0].text, "durable knowledge");
}

#[tokio::test]
async fn purge_then_reingest_replaces_corpus() {
    let engine = test_engine(MockProvider::default()).await;
    let namespace = ns("alice", "tutor");

    engine.ingest(&namespace, "old lecture one").await.unwrap();
    engine.ingest(&namespace, "old lecture two").await.unwrap();

    let removed = engine.purge(&namespace).await.unwrap();
    assert_eq!(removed, 2);

    // Knowledge base still exists, just empty.
    assert!(engine.retrieve(&namespace, "old lecture one", 5).await.unwrap().is_empty());

    engine.ingest(&namespace, "new lecture").await.unwrap();
    let records = engine.retrieve(&namespace, "new lecture", 5).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "new lecture");
}

#[tokio::test]
async fn deleted_documents_are_skipped_during_query() {
    let engine = test_engine(MockProvider::default()).await;
    let namespace = ns("alice", "tutor");

    let keep = engine.ingest(&namespace, "kept document").await.unwrap();
    let gone = engine.ingest(&namespace, "removed document").await.unwrap();

    // Delete one row out from under the index; its stale ordinal must be
    // skipped rather than failing the query.
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(gone.0)
        .execute(engine.store().pool())
        .await
        .unwrap();

    let records = engine.retrieve(&namespace, "removed document", 2).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, keep);

    // When nothing resolves any more, the query reports no relevant context.
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(keep.0)
        .execute(engine.store().pool())
        .await
        .unwrap();
    engine.create_session(&namespace, "s1", "sys");
    let result = engine.query(&namespace, "s1", "anything at all").await;
    assert!(matches!(result, Err(EngineError::NoRelevantContext)));
}

#[tokio::test]
async fn invalid_identifier_rejected_before_any_call() {
    assert!(Namespace::resolve("", "tutor", None).is_err());
    assert!(Namespace::resolve("alice", "tu/tor", None).is_err());
}

#[tokio::test]
async fn session_lifecycle_through_engine() {
    let engine = test_engine(MockProvider::default()).await;
    let namespace = ns("alice", "tutor");

    engine.create_session(&namespace, "s1", "first");
    assert!(engine.session_exists(&namespace, "s1"));

    engine.create_session(&namespace, "s1", "second");
    let transcript = engine.transcript(&namespace, "s1").unwrap();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].content, "second");

    engine.delete_session(&namespace, "s1").unwrap();
    assert!(!engine.session_exists(&namespace, "s1"));
    assert!(matches!(
        engine.delete_session(&namespace, "s1"),
        Err(EngineError::SessionNotFound)
    ));
}

#[tokio::test]
async fn scoped_namespaces_are_isolated() {
    let engine = test_engine(MockProvider::default()).await;
    let physics = Namespace::resolve("alice", "tutor", Some("physics")).unwrap();
    let history = Namespace::resolve("alice", "tutor", Some("history")).unwrap();

    engine.ingest(&physics, "Newton's laws of motion").await.unwrap();

    let result = engine.retrieve(&history, "Newton's laws of motion", 1).await;
    assert!(matches!(result, Err(EngineError::NoKnowledgeBase)));

    let records = engine
        .retrieve(&physics, "Newton's laws of motion", 1)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}
