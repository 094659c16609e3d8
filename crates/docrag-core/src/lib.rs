//! # docrag core
//!
//! Retrieval-augmented generation over a local document corpus: data
//! models, paragraph chunking, the three capability traits the pipeline
//! consumes ([`EmbeddingProvider`](embedding::EmbeddingProvider),
//! [`VectorStore`](store::VectorStore),
//! [`TextCompletionModel`](generate::TextCompletionModel)) and the
//! components built on top of them.
//!
//! This crate contains no tokio runtime, sqlx, HTTP client or filesystem
//! I/O. Concrete backends live in the `docrag` application crate; tests
//! here use [`MemoryVectorStore`](store::MemoryVectorStore) and
//! [`HashingEmbedder`](embedding::HashingEmbedder).
//!
//! | Module | Component |
//! |--------|-----------|
//! | [`reconcile`] | Indexing Coordinator and the [`DocumentSource`](reconcile::DocumentSource) seam |
//! | [`index`] | Index Store Adapter |
//! | [`retrieve`] | Context Retriever |
//! | [`prompt`] | Prompt Builder |
//! | [`generate`] | Generation Streamer |
//! | [`service`] | [`RagService`](service::RagService), the request-level facade |

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod models;
pub mod prompt;
pub mod reconcile;
pub mod retrieve;
pub mod service;
pub mod store;

pub use error::{EmbeddingError, GenerationError, LoadError, RagError, StoreError};
pub use service::RagService;
