//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the narrow contract the pipeline needs from
//! an external key/vector store, scoped to a single collection. Embeddings
//! are always computed by the caller; the store only persists and compares
//! them.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorStore::upsert) | Insert or overwrite entries by id |
//! | [`query`](VectorStore::query) | k nearest entries, ascending distance |
//! | [`list_metadata`](VectorStore::list_metadata) | Page through entry metadata |
//! | [`count`](VectorStore::count) | Number of entries |
//! | [`signature`](VectorStore::signature) | Embedding function the collection is pinned to |
//! | [`pin_signature`](VectorStore::pin_signature) | Pin the collection to an embedding function |

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{EmbeddingSignature, EntryMetadata, IndexEntry, RetrievedChunk};

pub use memory::MemoryVectorStore;

/// Abstract vector store for one collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite entries keyed by `entry.chunk.id`.
    ///
    /// Writing the same id twice must replace the earlier entry, never
    /// fail or duplicate it. An empty slice is a no-op.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), StoreError>;

    /// Return up to `k` entries nearest to `embedding`, most similar first.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, StoreError>;

    /// Return at most `limit` metadata rows with `id > after`, ordered by id.
    async fn list_metadata(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EntryMetadata>, StoreError>;

    /// Number of entries in the collection.
    async fn count(&self) -> Result<u64, StoreError>;

    /// The embedding signature recorded for this collection, if any.
    async fn signature(&self) -> Result<Option<EmbeddingSignature>, StoreError>;

    /// Record `signature` unless one is already recorded, and return the
    /// signature the collection is pinned to afterwards.
    ///
    /// Must be insert-if-absent: a concurrent caller presenting a different
    /// signature gets the first one back, never overwrites it.
    async fn pin_signature(
        &self,
        signature: &EmbeddingSignature,
    ) -> Result<EmbeddingSignature, StoreError>;
}

/// Sort candidates by ascending distance and keep the first `k`.
///
/// Ties are broken by source then chunk index so results are stable.
pub fn rank_candidates(mut candidates: Vec<RetrievedChunk>, k: usize) -> Vec<RetrievedChunk> {
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    candidates.truncate(k);
    candidates
}
