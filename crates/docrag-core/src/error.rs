//! Error kinds for the retrieval-augmented generation pipeline.
//!
//! Each external collaborator has its own error type so callers can apply
//! different policies: a [`LoadError`] or [`EmbeddingError`] during reconcile
//! only affects one document, while a [`StoreError`] aborts the run and a
//! [`GenerationError`] terminates the request.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error from a backend the core does not know about (sqlx, reqwest, ...).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A document could not be listed or read.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("document directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list {}: {message}", path.display())]
    Scan { path: PathBuf, message: String },
}

/// The external embedding function failed.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding count mismatch: sent {expected} texts, got {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// The vector store is unreachable, corrupt, or bound to another embedding.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vector store backend error: {0}")]
    Backend(#[source] BoxError),

    #[error(
        "collection is pinned to embedding model '{expected}' ({expected_dims} dims), \
         but the configured model is '{actual}' ({actual_dims} dims)"
    )]
    EmbeddingMismatch {
        expected: String,
        expected_dims: usize,
        actual: String,
        actual_dims: usize,
    },

    #[error("corrupt index entry {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

/// The text-completion model failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("model request failed: {0}")]
    Request(String),

    #[error("model returned an error: {0}")]
    Model(String),

    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

/// Umbrella error for request-level operations.
#[derive(Error, Debug)]
pub enum RagError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}
