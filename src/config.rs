//! Configuration for indexing, querying and evaluation.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Vision-language model configuration (OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o", "qwen3-vl-4b-instruct")
    pub model: String,

    /// Maximum tokens for response
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "Qwen/Qwen3-VL-4B-Instruct".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
        }
    }
}

/// Which judge implementation scores generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeBackend {
    /// Locally served model (Ollama-compatible API), no credential needed.
    #[serde(alias = "ollama")]
    Local,
    /// Hosted chat-completion API authenticated with an API key.
    #[serde(alias = "openai")]
    Hosted,
}

impl JudgeBackend {
    /// Parse from a CLI or environment string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "ollama" => Some(JudgeBackend::Local),
            "hosted" | "openai" => Some(JudgeBackend::Hosted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeBackend::Local => "local",
            JudgeBackend::Hosted => "hosted",
        }
    }
}

/// LLM-as-judge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub backend: JudgeBackend,
    pub model_name: String,
    /// Base URL of the hosted chat-completion API.
    pub api_base: String,
    /// Environment variable holding the hosted API key.
    pub api_key_env_var: String,
    /// Base URL of the local model server. `OLLAMA_HOST` overrides it.
    pub base_url: String,
    pub temperature: f32,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            backend: JudgeBackend::Hosted,
            model_name: "gpt-4o".to_string(),
            api_base: "https://api.openai.com".to_string(),
            api_key_env_var: "OPENAI_API_KEY".to_string(),
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.0,
            max_retries: 3,
            timeout_secs: 60,
        }
    }
}

/// Retrieval and generation knobs for a RAG query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub default_top_k: usize,
    pub default_max_new_tokens: u32,
    /// Pages to include before each retrieved page.
    pub pages_before: u32,
    /// Pages to include after each retrieved page.
    pub pages_after: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_top_k: 1,
            default_max_new_tokens: 200,
            pages_before: 1,
            pages_after: 1,
        }
    }
}

/// Evaluation run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub judge: JudgeConfig,
    pub output_dir: PathBuf,
    /// Write one checkpoint file per test case as soon as it is scored.
    pub save_intermediate: bool,
    /// Reuse existing checkpoints instead of re-running their test cases.
    pub resume: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            judge: JudgeConfig::default(),
            output_dir: PathBuf::from("evaluation_results"),
            save_intermediate: true,
            resume: false,
        }
    }
}

/// Where page images live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Lowercase file extensions accepted as page images.
    pub supported_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            supported_extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
        }
    }
}

/// Qdrant vector database connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub collection_name: String,
    /// Dimension of each patch vector.
    pub vector_size: usize,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection_name: "colpali_pages".to_string(),
            vector_size: 128,
        }
    }
}

/// Multi-vector embedding server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Vision-language model settings
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub evaluation: EvaluationConfig,
    pub storage: StorageConfig,
    pub qdrant: QdrantConfig,
    pub embedder: EmbedderConfig,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, JUDGE_MODEL, QDRANT_URL, ...)
    /// 2. Config file (~/.config/colpali-rag/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text. Missing sections keep their defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| RagError::Config(format!("Failed to parse config file: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Ok(backend) = env::var("JUDGE_BACKEND") {
            if let Some(backend) = JudgeBackend::parse(&backend) {
                self.evaluation.judge.backend = backend;
            }
        }

        if let Ok(model) = env::var("JUDGE_MODEL") {
            self.evaluation.judge.model_name = model;
        }

        if let Ok(url) = env::var("QDRANT_URL") {
            self.qdrant.url = url;
        }

        if let Ok(url) = env::var("EMBEDDER_URL") {
            self.embedder.base_url = url;
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "colpali-rag")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate the settings the query path depends on.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(RagError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(RagError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        if self.rag.default_top_k == 0 {
            return Err(RagError::Config("rag.default_top_k must be at least 1".to_string()));
        }

        if self.evaluation.judge.max_retries == 0 {
            return Err(RagError::Config(
                "evaluation.judge.max_retries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert_eq!(config.rag.default_top_k, 1);
        assert_eq!(config.rag.pages_before, 1);
        assert_eq!(config.rag.pages_after, 1);
        assert_eq!(config.evaluation.judge.backend, JudgeBackend::Hosted);
        assert_eq!(config.evaluation.judge.temperature, 0.0);
        assert_eq!(config.evaluation.judge.max_retries, 3);
        assert!(config.evaluation.save_intermediate);
        assert!(!config.evaluation.resume);
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = Config::default();
        config.llm.api_base = "http://localhost:8001".to_string();
        assert!(config.validate().is_ok());

        config.rag.default_top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
rag:
  pages_before: 0
  pages_after: 2
evaluation:
  judge:
    backend: ollama
    model_name: llama3.1:8b
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.rag.pages_before, 0);
        assert_eq!(config.rag.pages_after, 2);
        assert_eq!(config.rag.default_top_k, 1);
        assert_eq!(config.evaluation.judge.backend, JudgeBackend::Local);
        assert_eq!(config.evaluation.judge.model_name, "llama3.1:8b");
        assert_eq!(config.evaluation.judge.max_retries, 3);
        assert_eq!(config.qdrant.collection_name, "colpali_pages");
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("rag: 42").is_err());
    }

    #[test]
    fn test_judge_backend_parse() {
        assert_eq!(JudgeBackend::parse("Ollama"), Some(JudgeBackend::Local));
        assert_eq!(JudgeBackend::parse("hosted"), Some(JudgeBackend::Hosted));
        assert_eq!(JudgeBackend::parse("openai"), Some(JudgeBackend::Hosted));
        assert_eq!(JudgeBackend::parse("other"), None);
    }
}
