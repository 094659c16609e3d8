//! Indexing Coordinator: idempotent ingestion of a document set.
//!
//! [`IndexingCoordinator::reconcile`] diffs the documents a
//! [`DocumentSource`] yields against the sources already recorded in the
//! index, and chunks, embeds and upserts only the unseen ones.
//!
//! # Idempotence
//!
//! Identity is the document id (its path), not its content. Running
//! reconcile twice over an unchanged directory performs zero upserts on the
//! second run; a file edited in place is not re-indexed.
//!
//! Concurrent reconcile runs need no lock: chunk ids are deterministic and
//! the store overwrites by id, so two runs racing on the same document write
//! identical entries.
//!
//! # Failure policy
//!
//! | Error | Effect |
//! |-------|--------|
//! | [`LoadError`] | Document skipped, recorded in `failures`, run continues |
//! | [`EmbeddingError`](crate::error::EmbeddingError) | Same as above |
//! | [`StoreError`](crate::error::StoreError) | Run aborts; entries already written stay in place |

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::chunk_document;
use crate::error::{LoadError, RagError};
use crate::index::IndexStore;
use crate::models::Document;

/// Lazily yields documents; each item is read when the iterator reaches it.
pub type DocumentIter<'a> = Box<dyn Iterator<Item = Result<Document, LoadError>> + Send + 'a>;

/// A restartable collection of documents.
///
/// Every call to [`scan`](DocumentSource::scan) starts a fresh pass over the
/// underlying location.
pub trait DocumentSource: Send + Sync {
    /// Human-readable location, for logs and reports.
    fn describe(&self) -> String;

    /// Begin a new pass. Fails only if the source as a whole is unusable.
    fn scan(&self) -> Result<DocumentIter<'_>, LoadError>;
}

/// In-memory document set.
impl DocumentSource for Vec<Document> {
    fn describe(&self) -> String {
        format!("{} in-memory documents", self.len())
    }

    fn scan(&self) -> Result<DocumentIter<'_>, LoadError> {
        Ok(Box::new(self.iter().cloned().map(Ok)))
    }
}

/// Warning attached to a report when the index ends up empty.
pub const EMPTY_INDEX_WARNING: &str =
    "index is empty after reconcile: every query will run without context";

/// A document that could not be indexed during a reconcile run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFailure {
    pub document: String,
    pub error: String,
}

/// Summary of one reconcile run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Documents chunked and upserted in this run.
    pub documents_indexed: usize,
    /// Documents already present in the index.
    pub documents_skipped: usize,
    /// Documents that produced no chunks (blank or whitespace-only).
    pub documents_empty: usize,
    /// Chunks upserted in this run.
    pub total_chunks: usize,
    /// Entries in the index after the run.
    pub index_size: u64,
    /// Per-document failures; these never abort the run.
    pub failures: Vec<DocumentFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Drives idempotent ingestion into an [`IndexStore`].
#[derive(Clone)]
pub struct IndexingCoordinator {
    index: IndexStore,
    max_tokens: usize,
}

impl IndexingCoordinator {
    pub fn new(index: IndexStore, max_tokens: usize) -> Self {
        Self { index, max_tokens }
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    /// Index every document in `source` that the index has not seen yet.
    pub async fn reconcile(
        &self,
        source: &dyn DocumentSource,
    ) -> Result<ReconcileReport, RagError> {
        let indexed = self.index.list_indexed_sources().await?;
        info!(
            source = %source.describe(),
            already_indexed = indexed.len(),
            "reconcile started"
        );

        let mut report = ReconcileReport::default();

        for item in source.scan()? {
            let doc = match item {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable document");
                    report.failures.push(DocumentFailure {
                        document: failed_path(&e),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if indexed.contains(&doc.id) {
                debug!(document = %doc.id, "already indexed, skipping");
                report.documents_skipped += 1;
                continue;
            }

            let chunks = chunk_document(&doc, self.max_tokens);
            if chunks.is_empty() {
                debug!(document = %doc.id, "no non-empty paragraphs");
                report.documents_empty += 1;
                continue;
            }

            match self.index.upsert(&chunks).await {
                Ok(written) => {
                    info!(document = %doc.id, chunks = written, "indexed");
                    report.documents_indexed += 1;
                    report.total_chunks += written;
                }
                Err(RagError::Store(e)) => return Err(RagError::Store(e)),
                Err(e) => {
                    warn!(document = %doc.id, error = %e, "failed to index document");
                    report.failures.push(DocumentFailure {
                        document: doc.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.index_size = self.index.count().await?;
        if report.index_size == 0 {
            warn!("{}", EMPTY_INDEX_WARNING);
            report.warning = Some(EMPTY_INDEX_WARNING.to_string());
        }

        info!(
            indexed = report.documents_indexed,
            skipped = report.documents_skipped,
            empty = report.documents_empty,
            failed = report.failures.len(),
            chunks = report.total_chunks,
            index_size = report.index_size,
            "reconcile finished"
        );
        Ok(report)
    }
}

fn failed_path(err: &LoadError) -> String {
    match err {
        LoadError::MissingDirectory(path)
        | LoadError::Read { path, .. }
        | LoadError::Scan { path, .. } => path.display().to_string(),
    }
}
