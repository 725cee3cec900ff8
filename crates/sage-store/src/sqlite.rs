use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::StoreError;
use crate::types::{DocumentId, DocumentRecord, Namespace};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the `SQLite` database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Each pooled connection to :memory: would get its own database, so
        // the in-memory case must stay on a single connection.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Expose the underlying pool for shared access.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a document and return the store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert(
        &self,
        namespace: &Namespace,
        text: &str,
        embedding: &[f32],
    ) -> Result<DocumentId, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO documents (owner, agent, scope, text, embedding) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(namespace.owner())
        .bind(namespace.agent())
        .bind(namespace.scope())
        .bind(text)
        .bind(encode_embedding(embedding))
        .fetch_one(&self.pool)
        .await?;
        Ok(DocumentId(row.0))
    }

    /// Fetch a document by id; `None` if it has been deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored embedding is corrupt.
    pub async fn get(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        let row: Option<(i64, String, String, Option<String>, String, Vec<u8>)> = sqlx::query_as(
            "SELECT id, owner, agent, scope, text, embedding FROM documents WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_record).transpose()
    }

    /// Delete every document belonging to a namespace, returning the number
    /// of rows removed. This is the replacement-semantics primitive: callers
    /// wanting "latest corpus only" delete and then re-ingest.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_namespace(&self, namespace: &Namespace) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE owner = ? AND agent = ? AND scope IS ?")
            .bind(namespace.owner())
            .bind(namespace.agent())
            .bind(namespace.scope())
            .execute(&self.pool)
            .await?;
        tracing::debug!(
            namespace = %namespace,
            removed = result.rows_affected(),
            "documents deleted"
        );
        Ok(result.rows_affected())
    }

    /// Count documents in a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self, namespace: &Namespace) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM documents WHERE owner = ? AND agent = ? AND scope IS ?",
        )
        .bind(namespace.owner())
        .bind(namespace.agent())
        .bind(namespace.scope())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Scan every persisted document in insertion order. Used only by the
    /// startup index rebuild.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored embedding is corrupt.
    pub async fn scan_all(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        let rows: Vec<(i64, String, String, Option<String>, String, Vec<u8>)> = sqlx::query_as(
            "SELECT id, owner, agent, scope, text, embedding FROM documents ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }
}

fn row_to_record(
    (id, owner, agent, scope, text, blob): (i64, String, String, Option<String>, String, Vec<u8>),
) -> Result<DocumentRecord, StoreError> {
    let embedding = decode_embedding(&blob).ok_or(StoreError::CorruptEmbedding { id })?;
    Ok(DocumentRecord {
        id: DocumentId(id),
        namespace: Namespace {
            owner,
            agent,
            scope,
        },
        text,
        embedding,
    })
}

/// Encode an embedding as a little-endian f32 byte blob.
#[must_use]
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a little-endian f32 byte blob; `None` if the length is not a
/// multiple of four.
#[must_use]
pub fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
