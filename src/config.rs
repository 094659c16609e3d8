use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docrag_core::retrieve::DEFAULT_TOP_K;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string(), "*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            url: default_ollama_url(),
            model: default_llm_model(),
            temperature: None,
            max_tokens: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
pub(crate) fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "qwen2:7b-instruct-q4_0".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.store.collection.trim().is_empty() {
        anyhow::bail!("store.collection must not be empty");
    }

    if config.documents.include_globs.is_empty() {
        anyhow::bail!("documents.include_globs must list at least one pattern");
    }

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hash" => {}
        "ollama" | "openai" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, ollama, or openai.",
            other
        ),
    }

    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.llm.provider.as_str() {
        "ollama" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be ollama.", other),
    }

    if let Some(t) = config.llm.temperature {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[db]
path = "./data/docrag.sqlite"

[documents]
dir = "./documents"
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.store.collection, "documents");
        assert_eq!(config.documents.include_globs, vec!["*.txt", "*.md"]);
        assert_eq!(config.chunking.max_tokens, 700);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.llm.model, "qwen2:7b-instruct-q4_0");
        assert_eq!(config.llm.url, "http://localhost:11434");
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let file = write_config(&format!("{}\n[retrieval]\ntop_k = 0\n", MINIMAL));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("retrieval.top_k"));
    }

    #[test]
    fn test_network_embedder_requires_model_and_dims() {
        let file = write_config(&format!("{}\n[embedding]\nprovider = \"ollama\"\n", MINIMAL));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let file = write_config(&format!(
            "{}\n[embedding]\nprovider = \"ollama\"\ndims = 768\n",
            MINIMAL
        ));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_rejects_unknown_providers() {
        let file = write_config(&format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL));
        assert!(load_config(file.path()).is_err());

        let file = write_config(&format!("{}\n[llm]\nprovider = \"magic\"\n", MINIMAL));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = load_config(Path::new("/nonexistent/docrag.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/docrag.toml"));
    }
}
