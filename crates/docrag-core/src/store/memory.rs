//! In-memory [`VectorStore`] implementation for tests and ephemeral runs.
//!
//! Uses a `BTreeMap` keyed by entry id behind `std::sync::RwLock`, so
//! metadata paging falls out of the map's ordering. Query is brute-force
//! cosine distance over all stored vectors.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::StoreError;
use crate::models::{EmbeddingSignature, EntryMetadata, IndexEntry, RetrievedChunk};

use super::{rank_candidates, VectorStore};

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, IndexEntry>,
    signature: Option<EmbeddingSignature>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct MemoryVectorStore {
    inner: RwLock<Inner>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    /// Ids of all stored entries, in order.
    pub fn ids(&self) -> Vec<String> {
        self.read()
            .map(|inner| inner.entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut inner = self.write()?;
        for entry in entries {
            inner.entries.insert(entry.chunk.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        let candidates = inner
            .entries
            .values()
            .map(|e| RetrievedChunk {
                id: e.chunk.id.clone(),
                text: e.chunk.text.clone(),
                source: e.chunk.document_id.clone(),
                chunk_index: e.chunk.chunk_index,
                distance: cosine_distance(embedding, &e.embedding),
            })
            .collect();
        Ok(rank_candidates(candidates, k))
    }

    async fn list_metadata(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EntryMetadata>, StoreError> {
        let inner = self.read()?;
        let lower = match after {
            Some(id) => Bound::Excluded(id.to_string()),
            None => Bound::Unbounded,
        };
        Ok(inner
            .entries
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, e)| EntryMetadata {
                id: id.clone(),
                metadata: e.chunk.metadata(),
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.entries.len() as u64)
    }

    async fn signature(&self) -> Result<Option<EmbeddingSignature>, StoreError> {
        Ok(self.read()?.signature.clone())
    }

    async fn pin_signature(
        &self,
        signature: &EmbeddingSignature,
    ) -> Result<EmbeddingSignature, StoreError> {
        let mut inner = self.write()?;
        Ok(inner.signature.get_or_insert_with(|| signature.clone()).clone())
    }
}
