//! Core data models used throughout docrag.
//!
//! These types represent the documents, chunks, index entries, and retrieval
//! results that flow through the indexing and query pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A source text unit, identified by its path relative to the scanned directory.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub path: Option<PathBuf>,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
            text: text.into(),
        }
    }
}

/// A non-empty paragraph-level piece of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.document_id.clone(),
            chunk_index: self.chunk_index,
            hash: self.hash.clone(),
        }
    }
}

/// Provenance stored alongside every index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_index: i64,
    pub hash: String,
}

/// The persisted unit: a chunk plus the embedding of its text.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

/// Metadata inventory row returned while paging through a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub id: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from a similarity query, most similar first.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub chunk_index: i64,
    /// `1 - cosine_similarity`; smaller is closer.
    pub distance: f32,
}

/// The embedding function a collection was built with.
///
/// Query-time embeddings are only comparable to index-time embeddings when
/// both come from the same model, so a collection records the signature of
/// the first embedder that wrote to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddingSignature {
    pub model: String,
    pub dims: usize,
}
