//! Network embedding providers.
//!
//! - **[`OllamaEmbedder`]** calls `POST {url}/api/embed` on a local Ollama.
//! - **[`OpenAIEmbedder`]** calls the OpenAI embeddings API, keyed by
//!   `OPENAI_API_KEY`.
//!
//! Both retry on HTTP 429, 5xx and connection errors with exponential
//! backoff (1s, 2s, 4s, ... capped at 32s), up to `embedding.max_retries`.
//! Any other status fails immediately.
//!
//! Use [`create_embedder`] to build the provider named in the config. The
//! `hash` provider is the offline [`HashingEmbedder`] from the core crate.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use docrag_core::embedding::{EmbeddingProvider, HashingEmbedder};
use docrag_core::error::EmbeddingError;

use crate::config::{default_ollama_url, EmbeddingConfig};

const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Build the embedding provider selected by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(match config.dims {
            Some(dims) => HashingEmbedder::new(dims),
            None => HashingEmbedder::default(),
        })),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn required_model_and_dims(config: &EmbeddingConfig, provider: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", provider))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {} provider", provider))?;
    Ok((model, dims))
}

/// Send the request built by `request` until it succeeds or retries run out.
async fn send_with_retry<F>(
    label: &str,
    max_retries: u32,
    request: F,
) -> Result<serde_json::Value, EmbeddingError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        match request().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                let message = format!("{} API error {}: {}", label, status, body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(%status, attempt, "{} embedding request failed, will retry", label);
                    last_err = Some(message);
                    continue;
                }
                return Err(EmbeddingError::Request(message));
            }
            Err(e) => {
                warn!(error = %e, attempt, "{} embedding connection failed", label);
                last_err = Some(format!("{} connection error: {}", label, e));
            }
        }
    }

    Err(EmbeddingError::Request(last_err.unwrap_or_else(|| {
        format!("{} embedding failed after retries", label)
    })))
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config, "Ollama")?;
        let url = config.url.clone().unwrap_or_else(default_ollama_url);

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url);
        let json = send_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            EmbeddingError::InvalidResponse("missing embeddings array in Ollama response".into())
        })?;

    embeddings.iter().map(parse_vector).collect()
}

// ============ OpenAI ============

pub struct OpenAIEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config, "OpenAI")?;
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };
        let url = config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string());

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/embeddings", self.url);
        let json = send_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        EmbeddingError::InvalidResponse("missing data array in OpenAI response".into())
    })?;

    data.iter()
        .map(|item| {
            item.get("embedding").map(parse_vector).unwrap_or_else(|| {
                Err(EmbeddingError::InvalidResponse(
                    "missing embedding in OpenAI response".into(),
                ))
            })
        })
        .collect()
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    let items = value
        .as_array()
        .ok_or_else(|| EmbeddingError::InvalidResponse("embedding is not an array".into()))?;
    items
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                EmbeddingError::InvalidResponse("non-numeric embedding value".into())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake Ollama `/api/embed` that fails the first `failures` calls with 503.
    async fn fake_ollama(failures: usize) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));

        async fn embed(
            State((calls, failures)): State<(Arc<AtomicUsize>, usize)>,
            Json(body): Json<serde_json::Value>,
        ) -> Result<Json<serde_json::Value>, StatusCode> {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                return Err(StatusCode::SERVICE_UNAVAILABLE);
            }
            let count = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
            let vectors: Vec<Vec<f32>> = (0..count).map(|i| vec![i as f32, 1.0, 0.0]).collect();
            Ok(Json(serde_json::json!({ "embeddings": vectors })))
        }

        let app = Router::new()
            .route("/api/embed", post(embed))
            .with_state((calls.clone(), failures));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    fn ollama_config(url: &str, max_retries: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".into(),
            model: Some("nomic-embed-text".into()),
            dims: Some(3),
            url: Some(url.to_string()),
            max_retries,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ollama_embeds_batch() {
        let (url, calls) = fake_ollama(0).await;
        let embedder = OllamaEmbedder::new(&ollama_config(&url, 0)).unwrap();
        let out = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![0.0, 1.0, 0.0], vec![1.0, 1.0, 0.0]]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ollama_retries_server_errors() {
        let (url, calls) = fake_ollama(1).await;
        let embedder = OllamaEmbedder::new(&ollama_config(&url, 2)).unwrap();
        let out = embedder.embed(&["a".to_string()]).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ollama_gives_up_without_retries() {
        let (url, _calls) = fake_ollama(1).await;
        let embedder = OllamaEmbedder::new(&ollama_config(&url, 0)).unwrap();
        let err = embedder.embed(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Request(_)));
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.5, 0.25]}, {"embedding": [1.0, 0.0]}]
        });
        let out = parse_openai_response(&json).unwrap();
        assert_eq!(out, vec![vec![0.5, 0.25], vec![1.0, 0.0]]);
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let json = serde_json::json!({ "embeddings": [["x"]] });
        assert!(matches!(
            parse_ollama_response(&json),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_create_embedder_hash_default() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.model_name(), HashingEmbedder::MODEL_NAME);
        assert_eq!(embedder.dims(), 256);
    }

    #[test]
    fn test_create_embedder_requires_model() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            dims: Some(768),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
