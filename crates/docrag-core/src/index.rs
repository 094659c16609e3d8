//! Index Store Adapter.
//!
//! [`IndexStore`] joins one [`VectorStore`] collection with the one
//! [`EmbeddingProvider`] allowed to write to and query it. Opening the
//! adapter pins the collection to the provider's [`EmbeddingSignature`];
//! opening it later with a different model or dimensionality fails with
//! [`StoreError::EmbeddingMismatch`] instead of silently producing
//! meaningless rankings.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::embedding::{validate_batch, EmbeddingProvider};
use crate::error::{RagError, StoreError};
use crate::models::{Chunk, IndexEntry, RetrievedChunk};
use crate::store::VectorStore;

/// Page size used when walking the metadata inventory.
pub const METADATA_PAGE_SIZE: usize = 256;

/// Default number of texts per embedding request.
pub const DEFAULT_EMBED_BATCH: usize = 64;

/// Embedding-aware wrapper over a vector store collection.
#[derive(Clone)]
pub struct IndexStore {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexStore {
    /// Bind `embedder` to the collection behind `store`.
    ///
    /// The first open records the embedder's signature; every later open
    /// must present the same one.
    pub async fn open(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, StoreError> {
        let wanted = embedder.signature();
        let pinned = match store.signature().await? {
            Some(pinned) => pinned,
            None => {
                info!(model = %wanted.model, dims = wanted.dims, "pinning collection embedding");
                store.pin_signature(&wanted).await?
            }
        };
        if pinned != wanted {
            return Err(StoreError::EmbeddingMismatch {
                expected: pinned.model,
                expected_dims: pinned.dims,
                actual: wanted.model,
                actual_dims: wanted.dims,
            });
        }

        Ok(Self {
            store,
            embedder,
            batch_size: DEFAULT_EMBED_BATCH,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    /// Distinct `source` values across every entry in the collection.
    ///
    /// Walks the whole metadata inventory page by page; stopping at the
    /// first page would under-report and cause duplicate indexing.
    pub async fn list_indexed_sources(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut sources = BTreeSet::new();
        let mut after: Option<String> = None;
        loop {
            let page = self
                .store
                .list_metadata(after.as_deref(), METADATA_PAGE_SIZE)
                .await?;
            let full = page.len() == METADATA_PAGE_SIZE;
            after = page.last().map(|m| m.id.clone());
            sources.extend(page.into_iter().map(|m| m.metadata.source));
            if !full {
                break;
            }
        }
        Ok(sources)
    }

    /// Embed and store `chunks` under their deterministic ids.
    ///
    /// All chunks are embedded before anything is written, so an embedding
    /// failure leaves the store untouched. Returns the number of entries
    /// written.
    pub async fn upsert(&self, chunks: &[Chunk]) -> Result<usize, RagError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            validate_batch(&vectors, texts.len(), self.embedder.dims())?;

            let indexed_at = Utc::now();
            entries.extend(batch.iter().zip(vectors).map(|(chunk, embedding)| IndexEntry {
                chunk: chunk.clone(),
                embedding,
                indexed_at,
            }));
        }

        self.store.upsert(&entries).await?;
        debug!(entries = entries.len(), "upserted index entries");
        Ok(entries.len())
    }

    /// The `k` entries nearest to `text`, most similar first.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed_one(text).await?;
        validate_batch(std::slice::from_ref(&embedding), 1, self.embedder.dims())?;
        Ok(self.store.query(&embedding, k).await?)
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.store.count().await
    }
}
