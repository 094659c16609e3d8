//! Ollama text-completion client.
//!
//! [`OllamaModel`] talks to `POST {url}/api/generate`. Non-streaming calls
//! send `"stream": false` and read the `response` field. Streaming calls
//! read the newline-delimited JSON body as it arrives: every line carries a
//! `response` fragment, the last one has `"done": true`, and a line with an
//! `error` field aborts the stream. A body that ends without `done` is
//! reported as a failure, not as a complete answer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use docrag_core::error::GenerationError;
use docrag_core::generate::{CompletionRequest, FragmentStream, TextCompletionModel};

use crate::config::LlmConfig;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Build the completion model selected by `config.provider`.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn TextCompletionModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

pub struct OllamaModel {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        // No client-wide timeout: it would also cap how long a stream may run.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut options = serde_json::Map::new();
        if let Some(t) = request.options.temperature {
            options.insert("temperature".into(), serde_json::json!(t));
        }
        if let Some(n) = request.options.max_tokens {
            options.insert("num_predict".into(), serde_json::json!(n));
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": stream,
        });
        if !options.is_empty() {
            body["options"] = serde_json::Value::Object(options);
        }
        body
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let mut builder = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&self.body(request, stream));
        if !stream {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await.map_err(|e| {
            GenerationError::Request(format!(
                "Ollama connection error (is Ollama running at {}?): {}",
                self.url, e
            ))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body_text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body_text);
        Err(GenerationError::Model(format!("Ollama API error {}: {}", status, message)))
    }
}

#[async_trait]
impl TextCompletionModel for OllamaModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        let response = self.send(request, false).await?;
        let chunk: GenerateChunk = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        if let Some(error) = chunk.error {
            return Err(GenerationError::Model(error));
        }
        Ok(chunk.response)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, GenerationError> {
        let response = self.send(request, true).await?;
        debug!(model = %request.model, "Ollama stream opened");
        Ok(ndjson_fragments(response.bytes_stream()))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

enum Line {
    Skip,
    Fragment { text: String, done: bool },
    Failed(GenerationError),
}

fn parse_line(line: &[u8]) -> Line {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Line::Skip;
    }
    match serde_json::from_slice::<GenerateChunk>(line) {
        Ok(GenerateChunk {
            error: Some(error), ..
        }) => Line::Failed(GenerationError::Model(error)),
        Ok(chunk) => Line::Fragment {
            text: chunk.response,
            done: chunk.done,
        },
        Err(e) => Line::Failed(GenerationError::InvalidResponse(format!(
            "malformed stream line: {}",
            e
        ))),
    }
}

struct NdjsonState<S> {
    body: Pin<Box<S>>,
    buf: Vec<u8>,
    eof: bool,
    finished: bool,
}

/// Turn an NDJSON byte stream into generation fragments.
///
/// Byte chunks may split lines anywhere; only complete lines are parsed.
/// Empty fragments are dropped.
pub fn ndjson_fragments<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = NdjsonState {
        body: Box::pin(body),
        buf: Vec::new(),
        eof: false,
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                match parse_line(&line) {
                    Line::Skip => continue,
                    Line::Fragment { text, done } => {
                        st.finished = done;
                        if text.is_empty() {
                            continue;
                        }
                        return Some((Ok(text), st));
                    }
                    Line::Failed(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }

            if st.eof {
                st.finished = true;
                let err = GenerationError::InvalidResponse(
                    "stream ended before the model signalled completion".into(),
                );
                return Some((Err(err), st));
            }

            match st.body.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(GenerationError::Request(e.to_string())), st));
                }
                None => {
                    st.eof = true;
                    if !st.buf.is_empty() {
                        st.buf.push(b'\n');
                    }
                }
            }
        }
    })
    .boxed()
}
