//! Wiring: turns a [`Config`] into a ready [`RagService`].
//!
//! Every component is constructed here and passed down explicitly; nothing
//! below this module reaches for a global store or client.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use docrag_core::embedding::EmbeddingProvider;
use docrag_core::generate::{CompletionOptions, Generator, TextCompletionModel};
use docrag_core::index::IndexStore;
use docrag_core::reconcile::IndexingCoordinator;
use docrag_core::retrieve::ContextRetriever;
use docrag_core::RagService;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::create_model;
use crate::loader::DirectorySource;
use crate::sqlite_store::SqliteVectorStore;
use crate::{db, migrate};

/// Everything a command or the HTTP server needs for one process.
#[derive(Clone)]
pub struct App {
    pub config: Config,
    pub service: RagService,
    pub store: Arc<SqliteVectorStore>,
}

impl App {
    /// The configured document directory as a reconcile source.
    pub fn document_source(&self) -> Result<DirectorySource> {
        DirectorySource::from_config(&self.config.documents)
    }
}

/// Build the service from the configured providers.
pub async fn build_service(config: &Config) -> Result<App> {
    let embedder = create_embedder(&config.embedding)?;
    let model = create_model(&config.llm)?;
    build_service_with(config, embedder, model).await
}

/// Build the service around caller-supplied embedding and completion
/// backends; storage still comes from `config`.
pub async fn build_service_with(
    config: &Config,
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn TextCompletionModel>,
) -> Result<App> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let store = Arc::new(SqliteVectorStore::new(pool, &config.store.collection));
    let index = IndexStore::open(store.clone(), embedder)
        .await
        .with_context(|| format!("Failed to open collection '{}'", config.store.collection))?
        .with_batch_size(config.embedding.batch_size);

    let generator = Generator::new(model).with_options(CompletionOptions {
        temperature: config.llm.temperature,
        max_tokens: config.llm.max_tokens,
    });

    let service = RagService::new(
        IndexingCoordinator::new(index.clone(), config.chunking.max_tokens),
        ContextRetriever::new(index),
        generator,
        &config.llm.model,
    )
    .with_top_k(config.retrieval.top_k);

    info!(
        collection = %config.store.collection,
        db = %config.db.path.display(),
        "service ready"
    );

    Ok(App {
        config: config.clone(),
        service,
        store,
    })
}
