//! HTTP server tests against a real listener.

use async_trait::async_trait;
use futures::StreamExt;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use docrag::app::build_service_with;
use docrag::config::{Config, DbConfig, DocumentsConfig};
use docrag::server::router;
use docrag_core::embedding::HashingEmbedder;
use docrag_core::generate::{CompletionRequest, FragmentStream, TextCompletionModel};
use docrag_core::GenerationError;

/// Replies with the model id and the prompt length, or fails for model "broken".
struct StubModel;

impl StubModel {
    fn reply(request: &CompletionRequest) -> Result<String, GenerationError> {
        if request.model == "broken" {
            return Err(GenerationError::Model("model crashed".into()));
        }
        let last_line = request.prompt.lines().last().unwrap_or_default();
        Ok(format!(
            "[{}] {} temp={:?} max={:?}",
            request.model, last_line, request.options.temperature, request.options.max_tokens
        ))
    }
}

#[async_trait]
impl TextCompletionModel for StubModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        Self::reply(request)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, GenerationError> {
        let reply = Self::reply(request)?;
        let parts: Vec<Result<String, GenerationError>> = reply
            .split_inclusive(' ')
            .map(|p| Ok(p.to_string()))
            .collect();
        Ok(futures::stream::iter(parts).boxed())
    }
}

struct TestServer {
    _tmp: TempDir,
    base: String,
    client: reqwest::Client,
}

async fn start() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("documents");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("doc1.txt"),
        "Paris is the capital of France.\n\nIt is on the Seine.",
    )
    .unwrap();

    let config = Config {
        db: DbConfig {
            path: tmp.path().join("docrag.sqlite"),
        },
        store: Default::default(),
        documents: DocumentsConfig {
            dir: docs,
            include_globs: vec!["*.txt".into()],
        },
        chunking: Default::default(),
        retrieval: Default::default(),
        embedding: Default::default(),
        llm: Default::default(),
        server: Default::default(),
    };
    let app = build_service_with(&config, Arc::new(HashingEmbedder::default()), Arc::new(StubModel))
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(app)).await.unwrap();
    });

    TestServer {
        _tmp: tmp,
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_health() {
    let server = start().await;
    let body: serde_json::Value = server.get("/health").await.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_reconcile_then_stats() {
    let server = start().await;

    let (status, report) = server.post("/reconcile", serde_json::json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(report["documentsIndexed"], 1);
    assert_eq!(report["totalChunks"], 2);

    let (_, again) = server.post("/reconcile", serde_json::json!({})).await;
    assert_eq!(again["documentsIndexed"], 0);
    assert_eq!(again["documentsSkipped"], 1);

    let stats: serde_json::Value = server.get("/stats").await.json().await.unwrap();
    assert_eq!(stats["entries"], 2);
    assert_eq!(stats["sources"], 1);
    assert_eq!(stats["embeddingModel"], "hashing-bow");
}

#[tokio::test]
async fn test_query_uses_default_model() {
    let server = start().await;
    let (status, body) = server
        .post("/query", serde_json::json!({"query": "What is the capital of France?"}))
        .await;
    assert_eq!(status, 200);
    let response = body["response"].as_str().unwrap();
    assert!(response.starts_with("[qwen2:7b-instruct-q4_0] Answer:"));
}

#[tokio::test]
async fn test_query_stream_matches_query() {
    let server = start().await;
    server.post("/reconcile", serde_json::json!({})).await;

    let (_, body) = server
        .post("/query", serde_json::json!({"query": "Where?", "k": 1, "model": "m"}))
        .await;
    let whole = body["response"].as_str().unwrap().to_string();

    let resp = server.get("/query/stream?query=Where%3F&k=1&model=m").await;
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(resp.text().await.unwrap(), whole);
}

#[tokio::test]
async fn test_query_validation() {
    let server = start().await;
    let (status, body) = server.post("/query", serde_json::json!({"query": "  "})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = server
        .post("/query", serde_json::json!({"query": "x", "k": 0}))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_generation_failure_is_bad_gateway() {
    let server = start().await;
    let (status, body) = server
        .post("/query", serde_json::json!({"query": "x", "model": "broken"}))
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "generation_failed");

    let resp = server.get("/query/stream?query=x&model=broken").await;
    assert_eq!(resp.status().as_u16(), 502);
}

#[tokio::test]
async fn test_rag_with_caller_context() {
    let server = start().await;
    let (status, body) = server
        .post(
            "/rag",
            serde_json::json!({"query": "Who?", "context": "Ada wrote it.", "model": "m"}),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["response"].as_str().unwrap().starts_with("[m] Answer:"));

    let resp = server.get("/rag-stream?query=Who%3F&context=Ada&model=m").await;
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), body["response"].as_str().unwrap());
}

#[tokio::test]
async fn test_generate_defaults_and_overrides() {
    let server = start().await;
    let (status, body) = server
        .post("/generate", serde_json::json!({"prompt": "Say hi"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["response"],
        "[qwen2:7b-instruct-q4_0] Say hi temp=Some(0.7) max=Some(100)"
    );

    let (_, body) = server
        .post(
            "/generate",
            serde_json::json!({
                "prompt": "Say hi",
                "max_tokens": 5,
                "temperature": 0.0,
                "model": "m"
            }),
        )
        .await;
    assert_eq!(body["response"], "[m] Say hi temp=Some(0.0) max=Some(5)");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let server = start().await;
    let resp = server
        .client
        .get(format!("{}/health", server.base))
        .header("Origin", "http://example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}
