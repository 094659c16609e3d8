//! SQLite-backed [`VectorStore`] implementation.
//!
//! One [`SqliteVectorStore`] serves one collection. Entries live in the
//! `entries` table keyed by `(collection, id)`; the pinned embedding
//! signature lives in `collections`. Similarity is brute-force cosine over
//! the stored BLOBs, computed in Rust.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use docrag_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use docrag_core::error::StoreError;
use docrag_core::models::{
    ChunkMetadata, EmbeddingSignature, EntryMetadata, IndexEntry, RetrievedChunk,
};
use docrag_core::store::{rank_candidates, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Timestamp of the most recent write to this collection, if any.
    pub async fn last_indexed_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let ts: Option<i64> =
            sqlx::query_scalar("SELECT MAX(indexed_at) FROM entries WHERE collection = ?")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::backend)?;
        Ok(ts.and_then(|t| DateTime::from_timestamp(t, 0)))
    }

    /// Number of distinct sources in this collection.
    pub async fn source_count(&self) -> Result<u64, StoreError> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM entries WHERE collection = ?")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::backend)?;
        Ok(n as u64)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        for entry in entries {
            let blob = vec_to_blob(&entry.embedding);
            sqlx::query(
                r#"
                INSERT INTO entries (id, collection, source, chunk_index, text, hash,
                                     embedding, dims, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    source = excluded.source,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    hash = excluded.hash,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(&entry.chunk.id)
            .bind(&self.collection)
            .bind(&entry.chunk.document_id)
            .bind(entry.chunk.chunk_index)
            .bind(&entry.chunk.text)
            .bind(&entry.chunk.hash)
            .bind(&blob)
            .bind(entry.embedding.len() as i64)
            .bind(entry.indexed_at.timestamp())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        }
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, source, chunk_index, text, embedding, dims
            FROM entries
            WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let dims: i64 = row.get("dims");
            if blob_len(dims) != Some(blob.len()) {
                return Err(StoreError::Corrupt {
                    id,
                    reason: format!("embedding is {} bytes, expected {} dims", blob.len(), dims),
                });
            }
            let vector = blob_to_vec(&blob);
            candidates.push(RetrievedChunk {
                id,
                text: row.get("text"),
                source: row.get("source"),
                chunk_index: row.get("chunk_index"),
                distance: cosine_distance(embedding, &vector),
            });
        }

        Ok(rank_candidates(candidates, k))
    }

    async fn list_metadata(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EntryMetadata>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, chunk_index, hash
            FROM entries
            WHERE collection = ? AND id > ?
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(&self.collection)
        .bind(after.unwrap_or(""))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(rows
            .iter()
            .map(|row| EntryMetadata {
                id: row.get("id"),
                metadata: ChunkMetadata {
                    source: row.get("source"),
                    chunk_index: row.get("chunk_index"),
                    hash: row.get("hash"),
                },
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(n as u64)
    }

    async fn signature(&self) -> Result<Option<EmbeddingSignature>, StoreError> {
        let row = sqlx::query("SELECT model, dims FROM collections WHERE name = ?")
            .bind(&self.collection)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        row.map(|r| {
            let dims: i64 = r.get("dims");
            let dims = usize::try_from(dims).map_err(|_| StoreError::Corrupt {
                id: self.collection.clone(),
                reason: format!("collection has invalid dims {}", dims),
            })?;
            Ok(EmbeddingSignature {
                model: r.get("model"),
                dims,
            })
        })
        .transpose()
    }

    async fn pin_signature(
        &self,
        signature: &EmbeddingSignature,
    ) -> Result<EmbeddingSignature, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO collections (name, model, dims, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&self.collection)
        .bind(&signature.model)
        .bind(signature.dims as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        self.signature().await?.ok_or_else(|| StoreError::Corrupt {
            id: self.collection.clone(),
            reason: "collection signature missing after pin".to_string(),
        })
    }
}

/// Expected BLOB length for a stored dimension count, if the count is sane.
fn blob_len(dims: i64) -> Option<usize> {
    usize::try_from(dims).ok()?.checked_mul(4)
}
