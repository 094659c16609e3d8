//! Context Retriever.
//!
//! Turns a query into the context block handed to the prompt builder: the
//! top-k chunks from the [`IndexStore`], most similar first, joined with
//! [`CONTEXT_DELIMITER`] so the model sees chunk boundaries instead of one
//! run of prose.

use tracing::debug;

use crate::error::RagError;
use crate::index::IndexStore;
use crate::models::RetrievedChunk;

/// Placed between consecutive chunks in the context block.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Default number of chunks retrieved per query.
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Clone)]
pub struct ContextRetriever {
    index: IndexStore,
}

impl ContextRetriever {
    pub fn new(index: IndexStore) -> Self {
        Self { index }
    }

    /// The ranked chunks behind [`retrieve`](Self::retrieve).
    pub async fn retrieve_chunks(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let chunks = self.index.query(query, k).await?;
        debug!(k, hits = chunks.len(), "retrieved context");
        Ok(chunks)
    }

    /// Context block for `query`; empty when the index has nothing to offer.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<String, RagError> {
        let chunks = self.retrieve_chunks(query, k).await?;
        Ok(join_context(&chunks))
    }
}

/// Join chunk texts in rank order with [`CONTEXT_DELIMITER`].
pub fn join_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_document;
    use crate::embedding::HashingEmbedder;
    use crate::models::Document;
    use crate::store::MemoryVectorStore;
    use std::sync::Arc;

    async fn retriever(docs: &[(&str, &str)]) -> ContextRetriever {
        let index = IndexStore::open(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashingEmbedder::default()),
        )
        .await
        .unwrap();
        for (id, text) in docs {
            let chunks = chunk_document(&Document::new(*id, *text), 700);
            index.upsert(&chunks).await.unwrap();
        }
        ContextRetriever::new(index)
    }

    #[tokio::test]
    async fn test_empty_index_gives_empty_context() {
        let r = retriever(&[]).await;
        assert_eq!(r.retrieve("anything", 3).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_joins_in_rank_order() {
        let r = retriever(&[("a.txt", "apples are red\n\nbananas are yellow\n\ncherries")]).await;
        let context = r.retrieve("apples red bananas", 2).await.unwrap();
        let parts: Vec<&str> = context.split(CONTEXT_DELIMITER).collect();
        assert_eq!(parts, vec!["apples are red", "bananas are yellow"]);
    }

    #[tokio::test]
    async fn test_single_hit_has_no_delimiter() {
        let r = retriever(&[("a.txt", "only paragraph")]).await;
        let context = r.retrieve("paragraph", 3).await.unwrap();
        assert_eq!(context, "only paragraph");
    }

    #[test]
    fn test_join_context_empty() {
        assert_eq!(join_context(&[]), "");
    }
}
