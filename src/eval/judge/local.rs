//! Judge backed by a locally served model (Ollama-compatible API).

use super::{Judge, RetryPolicy, parse_generation_response};
use crate::config::JudgeConfig;
use crate::error::{RagError, Result};
use crate::eval::metrics::GenerationEvalResult;
use crate::llm::Prompts;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default local model server.
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:11434";

/// Environment variable that overrides the configured server URL.
const HOST_ENV_VAR: &str = "OLLAMA_HOST";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// LLM-as-judge over a local model server. No credential is needed.
pub struct LocalJudge {
    client: Client,
    base_url: String,
    model_name: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl LocalJudge {
    /// Create a judge. `OLLAMA_HOST` takes precedence over `config.base_url`.
    pub fn new(config: &JudgeConfig) -> Result<Self> {
        let base_url = env::var(HOST_ENV_VAR)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| config.base_url.clone());
        Self::with_base_url(config, &base_url)
    }

    /// Create a judge talking to an explicit server URL.
    pub fn with_base_url(config: &JudgeConfig, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            model_name: config.model_name.clone(),
            temperature: config.temperature,
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model_name,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RagError::LlmApi(format!(
                "Local model request failed ({}): {}",
                status, body
            )));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::LlmApi(format!("Unexpected local model response: {}", e)))?;
        Ok(parsed.response)
    }
}

/// Accept `host:port` as well as full URLs, and drop trailing slashes.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

#[async_trait]
impl Judge for LocalJudge {
    async fn evaluate_generation(
        &self,
        question: &str,
        expected_answer: &str,
        generated_answer: &str,
    ) -> Result<GenerationEvalResult> {
        let prompt = Prompts::render_judge_generation(question, expected_answer, generated_answer);
        let response = self.retry.run(|| self.call_llm(&prompt)).await?;
        parse_generation_response(&response)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
