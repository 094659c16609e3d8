//! The request-level entry points of docrag.
//!
//! [`RagService`] composes the Indexing Coordinator, Context Retriever,
//! Prompt Builder and Generator behind the operations transports call:
//! reconcile a document source, and answer a query either as a stream of
//! fragments or as one string. Every dependency is passed in at
//! construction; there is no process-wide client or collection handle.

use tracing::info;

use crate::error::{GenerationError, RagError};
use crate::generate::{CompletionOptions, GenerationStream, Generator};
use crate::prompt::build_prompt;
use crate::reconcile::{DocumentSource, IndexingCoordinator, ReconcileReport};
use crate::retrieve::{ContextRetriever, DEFAULT_TOP_K};

#[derive(Clone)]
pub struct RagService {
    coordinator: IndexingCoordinator,
    retriever: ContextRetriever,
    generator: Generator,
    top_k: usize,
    default_model: String,
}

impl RagService {
    pub fn new(
        coordinator: IndexingCoordinator,
        retriever: ContextRetriever,
        generator: Generator,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            retriever,
            generator,
            top_k: DEFAULT_TOP_K,
            default_model: default_model.into(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn coordinator(&self) -> &IndexingCoordinator {
        &self.coordinator
    }

    /// Index every document in `source` not yet present in the index.
    pub async fn reconcile_index(
        &self,
        source: &dyn DocumentSource,
    ) -> Result<ReconcileReport, RagError> {
        self.coordinator.reconcile(source).await
    }

    /// Retrieve context for `query` and render the prompt sent to the model.
    pub async fn render_prompt(&self, query: &str, k: Option<usize>) -> Result<String, RagError> {
        let k = k.unwrap_or(self.top_k);
        let context = self.retriever.retrieve(query, k).await?;
        Ok(build_prompt(query, &context))
    }

    /// Answer `query` from indexed context, streaming fragments as the model
    /// produces them.
    pub async fn answer_query_stream(
        &self,
        query: &str,
        k: Option<usize>,
        model: Option<&str>,
    ) -> Result<GenerationStream, RagError> {
        let prompt = self.render_prompt(query, k).await?;
        let model = model.unwrap_or(&self.default_model);
        info!(model, "answering query (stream)");
        Ok(self.generator.stream(&prompt, model).await?)
    }

    /// Answer `query` from indexed context in one response.
    pub async fn answer_query(
        &self,
        query: &str,
        k: Option<usize>,
        model: Option<&str>,
    ) -> Result<String, RagError> {
        let prompt = self.render_prompt(query, k).await?;
        let model = model.unwrap_or(&self.default_model);
        info!(model, "answering query");
        Ok(self.generator.generate(&prompt, model).await?)
    }

    /// Answer `query` over caller-supplied context, bypassing retrieval.
    pub async fn answer_with_context(
        &self,
        query: &str,
        context: &str,
        model: Option<&str>,
    ) -> Result<String, GenerationError> {
        let prompt = build_prompt(query, context);
        self.generator
            .generate(&prompt, model.unwrap_or(&self.default_model))
            .await
    }

    /// Streaming variant of [`answer_with_context`](Self::answer_with_context).
    pub async fn answer_with_context_stream(
        &self,
        query: &str,
        context: &str,
        model: Option<&str>,
    ) -> Result<GenerationStream, GenerationError> {
        let prompt = build_prompt(query, context);
        self.generator
            .stream(&prompt, model.unwrap_or(&self.default_model))
            .await
    }

    /// Send `prompt` to the model as-is, without retrieval or templating.
    pub async fn complete_raw(
        &self,
        prompt: &str,
        model: Option<&str>,
        options: CompletionOptions,
    ) -> Result<String, GenerationError> {
        self.generator
            .generate_with_options(prompt, model.unwrap_or(&self.default_model), options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::generate::{CompletionRequest, FragmentStream, TextCompletionModel};
    use crate::index::IndexStore;
    use crate::models::Document;
    use crate::prompt::NO_CONTEXT;
    use crate::store::MemoryVectorStore;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::{Arc, Mutex};

    /// Echoes the prompt back in three-character fragments and records the
    /// last request it saw.
    #[derive(Default)]
    struct EchoModel {
        last: Mutex<Option<CompletionRequest>>,
    }

    impl EchoModel {
        fn record(&self, request: &CompletionRequest) {
            *self.last.lock().unwrap() = Some(request.clone());
        }
    }

    #[async_trait]
    impl TextCompletionModel for EchoModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
            self.record(request);
            Ok(request.prompt.clone())
        }

        async fn stream(
            &self,
            request: &CompletionRequest,
        ) -> Result<FragmentStream, GenerationError> {
            self.record(request);
            let chars: Vec<char> = request.prompt.chars().collect();
            let pieces: Vec<Result<String, GenerationError>> = chars
                .chunks(3)
                .map(|c| Ok(c.iter().collect::<String>()))
                .collect();
            Ok(futures::stream::iter(pieces).boxed())
        }
    }

    async fn service(model: Arc<EchoModel>) -> RagService {
        let index = IndexStore::open(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashingEmbedder::default()),
        )
        .await
        .unwrap();
        RagService::new(
            IndexingCoordinator::new(index.clone(), 700),
            ContextRetriever::new(index),
            Generator::new(model),
            "default-model",
        )
        .with_top_k(1)
    }

    fn corpus() -> Vec<Document> {
        vec![Document::new(
            "doc1.txt",
            "Paris is the capital of France.\n\nIt is on the Seine.",
        )]
    }

    #[tokio::test]
    async fn test_answer_uses_top_ranked_chunk() {
        let model = Arc::new(EchoModel::default());
        let svc = service(model.clone()).await;
        svc.reconcile_index(&corpus()).await.unwrap();

        let answer = svc
            .answer_query("What is the capital of France?", None, None)
            .await
            .unwrap();
        assert!(answer.contains("Paris is the capital of France."));
        assert!(!answer.contains("Seine"));
        assert!(answer.contains("What is the capital of France?"));

        let last = model.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.model, "default-model");
    }

    #[tokio::test]
    async fn test_stream_matches_non_stream() {
        let svc = service(Arc::new(EchoModel::default())).await;
        svc.reconcile_index(&corpus()).await.unwrap();

        let q = "What is the capital of France?";
        let streamed = svc
            .answer_query_stream(q, Some(2), Some("m"))
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        let whole = svc.answer_query(q, Some(2), Some("m")).await.unwrap();
        assert_eq!(streamed, whole);
        assert!(!streamed.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_answers_with_no_context_marker() {
        let svc = service(Arc::new(EchoModel::default())).await;
        let prompt = svc.render_prompt("Anyone there?", None).await.unwrap();
        assert!(prompt.contains(NO_CONTEXT));
        assert!(prompt.contains("Anyone there?"));
    }

    #[tokio::test]
    async fn test_answer_with_context_skips_retrieval() {
        let svc = service(Arc::new(EchoModel::default())).await;
        svc.reconcile_index(&corpus()).await.unwrap();
        let answer = svc
            .answer_with_context("Who?", "Ada wrote the first program.", None)
            .await
            .unwrap();
        assert!(answer.contains("Ada wrote the first program."));
        assert!(!answer.contains("Paris"));
    }

    #[tokio::test]
    async fn test_complete_raw_forwards_prompt_and_options() {
        let model = Arc::new(EchoModel::default());
        let svc = service(model.clone()).await;
        let options = CompletionOptions {
            temperature: Some(0.2),
            max_tokens: Some(50),
        };
        let out = svc
            .complete_raw("Say hi", Some("other"), options.clone())
            .await
            .unwrap();
        assert_eq!(out, "Say hi");
        let last = model.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.model, "other");
        assert_eq!(last.options, options);
    }

    #[tokio::test]
    async fn test_top_k_never_zero() {
        let svc = service(Arc::new(EchoModel::default())).await.with_top_k(0);
        assert_eq!(svc.top_k(), 1);
    }
}
