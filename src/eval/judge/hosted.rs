//! Judge backed by a hosted chat-completion API.

use super::{Judge, RetryPolicy, parse_generation_response};
use crate::config::{JudgeConfig, LlmConfig};
use crate::error::{RagError, Result};
use crate::eval::metrics::GenerationEvalResult;
use crate::llm::{LlmClient, Message, Prompts};
use async_trait::async_trait;
use std::env;
use std::time::Duration;

/// Token budget for a judge verdict.
const JUDGE_MAX_TOKENS: u32 = 1024;

/// LLM-as-judge over an OpenAI-compatible hosted API.
pub struct HostedJudge {
    client: LlmClient,
    retry: RetryPolicy,
}

impl HostedJudge {
    /// Create a judge, reading the API key from `config.api_key_env_var`.
    pub fn new(config: &JudgeConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env_var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RagError::MissingCredential(config.api_key_env_var.clone()))?;

        Self::with_api_key(config, api_key)
    }

    /// Create a judge with an explicit API key.
    pub fn with_api_key(config: &JudgeConfig, api_key: impl Into<String>) -> Result<Self> {
        let llm = LlmConfig {
            api_base: config.api_base.clone(),
            api_key: api_key.into(),
            model: config.model_name.clone(),
            max_tokens: JUDGE_MAX_TOKENS,
            temperature: config.temperature,
        };

        Ok(Self {
            client: LlmClient::with_timeout(llm, Duration::from_secs(config.timeout_secs))?,
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let response = self.client.chat(vec![Message::user(prompt)]).await?;
        if response.is_truncated() {
            tracing::warn!(
                model = self.client.model(),
                "judge verdict stopped at the output token limit"
            );
        }
        Ok(response.content)
    }
}

#[async_trait]
impl Judge for HostedJudge {
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
        self.client.model()
    }
}
