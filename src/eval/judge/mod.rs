//! LLM-as-judge scoring of generated answers.
//!
//! Both backends share the same contract: render the judge prompt, call the
//! model under a [`RetryPolicy`], then pull a JSON object out of whatever the
//! model wrote with [`parse_json_response`].

mod hosted;
mod local;

pub use hosted::HostedJudge;
pub use local::{DEFAULT_LOCAL_URL, LocalJudge};

use crate::config::{JudgeBackend, JudgeConfig};
use crate::error::{RagError, Result};
use crate::eval::metrics::{GenerationEvalResult, clamp_score};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;

/// Scores a generated answer against a reference answer.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate_generation(
        &self,
        question: &str,
        expected_answer: &str,
        generated_answer: &str,
    ) -> Result<GenerationEvalResult>;

    /// Model used for judging, recorded in the report.
    fn model_name(&self) -> &str;
}

/// Build the judge selected by `config.backend`.
///
/// The hosted judge resolves its API key here, so a missing credential fails
/// before any test case runs.
pub fn build_judge(config: &JudgeConfig) -> Result<Box<dyn Judge>> {
    match config.backend {
        JudgeBackend::Local => Ok(Box::new(LocalJudge::new(config)?)),
        JudgeBackend::Hosted => Ok(Box::new(HostedJudge::new(config)?)),
    }
}

/// Bounded retry with exponential backoff for judge calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &JudgeConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            ..Default::default()
        }
    }

    /// Delay after the failed attempt `attempt` (0-based): `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempts run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "judge call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Extract a JSON object from free-form model output.
///
/// Tries, in order: the whole response, the first fenced code block
/// (optionally tagged `json`), then each brace-balanced `{...}` span.
pub fn parse_json_response(response: &str) -> Result<Map<String, Value>> {
    if let Some(obj) = parse_object(response) {
        return Ok(obj);
    }

    if let Some(block) = fenced_block(response) {
        if let Some(obj) = parse_object(block) {
            return Ok(obj);
        }
    }

    first_braced_object(response).ok_or_else(|| RagError::judge_parse(response))
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Body of the first ```` ``` ```` block, without an optional `json` tag.
fn fenced_block(response: &str) -> Option<&str> {
    let open = response.find("```")?;
    let mut body = &response[open + 3..];
    if body.starts_with("json") {
        body = &body[4..];
    }
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Opening braces tried before giving up on free-form output.
const MAX_OBJECT_STARTS: usize = 32;

/// First brace-balanced `{...}` span that parses as an object.
fn first_braced_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{')
        .take(MAX_OBJECT_STARTS)
        .filter_map(|(start, _)| matching_close(text, start).map(|end| &text[start..=end]))
        .find_map(parse_object)
}

/// Index of the `}` closing the `{` at `start`, skipping braces inside strings.
fn matching_close(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}

fn score_field(obj: &Map<String, Value>, field: &str, raw: &str) -> Result<f64> {
    let value = match obj.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    value
        .filter(|v| v.is_finite())
        .map(clamp_score)
        .ok_or_else(|| RagError::JudgeSchema {
            field: field.to_string(),
            snippet: raw.chars().take(200).collect(),
        })
}

/// Turn a raw judge response into bounded scores.
pub fn parse_generation_response(response: &str) -> Result<GenerationEvalResult> {
    let obj = parse_json_response(response)?;

    let reasoning = match obj.get("reasoning") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let faithfulness_score = match obj.get("faithfulness_score") {
        None | Some(Value::Null) => None,
        Some(_) => Some(score_field(&obj, "faithfulness_score", response)?),
    };

    let unsupported_claims = obj
        .get("unsupported_claims")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        });

    Ok(GenerationEvalResult {
        correctness: score_field(&obj, "correctness", response)?,
        completeness: score_field(&obj, "completeness", response)?,
        relevance: score_field(&obj, "relevance", response)?,
        coherence: score_field(&obj, "coherence", response)?,
        overall_score: score_field(&obj, "overall_score", response)?,
        reasoning,
        faithfulness_score,
        unsupported_claims,
    })
}
