//! Generation Streamer.
//!
//! Wraps a [`TextCompletionModel`] and exposes its output either as one
//! string ([`Generator::generate`]) or as a [`GenerationStream`] of
//! [`StreamEvent`]s ([`Generator::stream`]).
//!
//! # Stream contract
//!
//! - Fragments arrive in the order the model produced them; nothing is
//!   buffered beyond the fragment being handed out.
//! - If the model fails before its first fragment, [`Generator::stream`]
//!   returns `Err` and no stream is created.
//! - Otherwise the stream yields zero or more [`StreamEvent::Fragment`]s,
//!   then exactly one terminal event ([`StreamEvent::Completed`] or
//!   [`StreamEvent::Failed`]), then `None`. Fragments already handed out
//!   before a failure are not retracted.
//! - Dropping a [`GenerationStream`] drops the upstream fragment source, which
//!   closes the model connection. No generation keeps running in the
//!   background.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GenerationError;

/// Raw fragment source produced by a model backend.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

/// Sampling options forwarded to the model backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One prompt sent to one model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub options: CompletionOptions,
}

/// An external text-completion service.
#[async_trait]
pub trait TextCompletionModel: Send + Sync {
    /// Generate the whole response in one call.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;

    /// Start a streaming generation. Dropping the returned stream must
    /// release the underlying connection.
    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, GenerationError>;
}

/// Item of a [`GenerationStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    Completed,
    Failed(GenerationError),
}

/// Fused stream of fragments with an explicit terminal event.
pub struct GenerationStream {
    first: Option<String>,
    inner: Option<FragmentStream>,
}

impl GenerationStream {
    fn new(first: Option<String>, inner: Option<FragmentStream>) -> Self {
        Self { first, inner }
    }

    /// Drain the stream into one string, failing if the stream failed.
    pub async fn collect_text(mut self) -> Result<String, GenerationError> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Fragment(f) => text.push_str(&f),
                StreamEvent::Completed => break,
                StreamEvent::Failed(e) => return Err(e),
            }
        }
        Ok(text)
    }

    /// Flatten into plain fragments for transports that only know
    /// "item or error": `Completed` ends the stream, `Failed` becomes the
    /// last item.
    pub fn into_fragments(self) -> BoxStream<'static, Result<String, GenerationError>> {
        self.filter_map(|event| async move {
            match event {
                StreamEvent::Fragment(f) => Some(Ok(f)),
                StreamEvent::Completed => None,
                StreamEvent::Failed(e) => Some(Err(e)),
            }
        })
        .boxed()
    }
}

impl Stream for GenerationStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(first) = this.first.take() {
            return Poll::Ready(Some(StreamEvent::Fragment(first)));
        }

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(fragment))) => Poll::Ready(Some(StreamEvent::Fragment(fragment))),
            Poll::Ready(Some(Err(e))) => {
                warn!(error = %e, "generation failed mid-stream");
                this.inner = None;
                Poll::Ready(Some(StreamEvent::Failed(e)))
            }
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(Some(StreamEvent::Completed))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Streaming and non-streaming generation over one model backend.
#[derive(Clone)]
pub struct Generator {
    model: Arc<dyn TextCompletionModel>,
    options: CompletionOptions,
}

impl Generator {
    pub fn new(model: Arc<dyn TextCompletionModel>) -> Self {
        Self {
            model,
            options: CompletionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    fn request(
        &self,
        prompt: &str,
        model_id: &str,
        options: Option<CompletionOptions>,
    ) -> CompletionRequest {
        CompletionRequest {
            prompt: prompt.to_string(),
            model: model_id.to_string(),
            options: options.unwrap_or_else(|| self.options.clone()),
        }
    }

    /// Stream the model's answer to `prompt`.
    ///
    /// Waits for the first fragment so that a failure before any output is
    /// reported as an error rather than as a stream that fails immediately.
    pub async fn stream(
        &self,
        prompt: &str,
        model_id: &str,
    ) -> Result<GenerationStream, GenerationError> {
        self.stream_with(self.request(prompt, model_id, None)).await
    }

    pub async fn stream_with(
        &self,
        request: CompletionRequest,
    ) -> Result<GenerationStream, GenerationError> {
        debug!(model = %request.model, prompt_len = request.prompt.len(), "starting stream");
        let mut upstream = self.model.stream(&request).await?;
        match upstream.next().await {
            Some(Ok(first)) => Ok(GenerationStream::new(Some(first), Some(upstream))),
            Some(Err(e)) => Err(e),
            None => Ok(GenerationStream::new(None, Some(futures::stream::empty().boxed()))),
        }
    }

    /// Generate the whole answer to `prompt` in one call.
    pub async fn generate(&self, prompt: &str, model_id: &str) -> Result<String, GenerationError> {
        self.generate_with(self.request(prompt, model_id, None)).await
    }

    pub async fn generate_with(
        &self,
        request: CompletionRequest,
    ) -> Result<String, GenerationError> {
        debug!(model = %request.model, prompt_len = request.prompt.len(), "generating");
        self.model.complete(&request).await
    }

    /// Like [`generate`](Self::generate) with per-call sampling options.
    pub async fn generate_with_options(
        &self,
        prompt: &str,
        model_id: &str,
        options: CompletionOptions,
    ) -> Result<String, GenerationError> {
        self.generate_with(self.request(prompt, model_id, Some(options))).await
    }
}
