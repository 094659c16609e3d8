//! # docrag
//!
//! Native application around [`docrag_core`]: TOML configuration, a SQLite
//! vector store, a directory document loader, Ollama/OpenAI clients, the
//! `docrag` CLI and an HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Directory  │──▶│  Reconcile   │──▶│  SQLite  │
//! │  *.txt/*.md │   │ Chunk+Embed  │   │ entries  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │ top-k
//!                   ┌──────────────┐   ┌────▼─────┐
//!   CLI / HTTP ────▶│ Prompt + LLM │◀──│ Retrieve │
//!                   └──────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | [`VectorStore`](docrag_core::store::VectorStore) over SQLite |
//! | [`loader`] | Directory document source |
//! | [`embedding`] | Ollama and OpenAI embedding clients |
//! | [`llm`] | Ollama completion client |
//! | [`app`] | Service wiring |
//! | [`server`] | HTTP server |

pub mod app;
pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
pub mod stats;

pub use docrag_core;
