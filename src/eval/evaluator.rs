//! Runs a test dataset through the RAG pipeline and scores every answer.

use super::dataset::{TestCase, TestDataset};
use super::judge::{Judge, build_judge};
use super::metrics::{
    GenerationEvalResult, GenerationMetricsAggregator, MetricMap, RetrievalEvalResult,
    RetrievalMetricsAggregator,
};
use crate::config::{EvaluationConfig, RagConfig};
use crate::error::{EvalStage, Result};
use crate::persistence::{load_checkpoint, save_checkpoint};
use crate::service::RagQuery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// Scored outcome of one test case. Also the checkpoint file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub test_case_id: String,
    pub question: String,
    pub generated_answer: String,
    pub expected_answer: String,
    pub generation_metrics: GenerationEvalResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_metrics: Option<RetrievalEvalResult>,
    /// Wall-clock time of the RAG query alone.
    pub latency_ms: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Settings an evaluation ran with, recorded in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub judge_type: String,
    pub judge_model: String,
    pub output_dir: PathBuf,
    pub save_intermediate: bool,
    pub resume: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_before: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_after: Option<u32>,
}

/// Final artifact of a dataset evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub dataset_name: String,
    pub total_test_cases: usize,
    pub aggregate_generation_metrics: MetricMap,
    /// Empty when the dataset carries no page ground truth at all.
    pub aggregate_retrieval_metrics: MetricMap,
    pub individual_results: Vec<EvaluationResult>,
    pub evaluation_config: ConfigSnapshot,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationReport {
    /// Mean RAG query latency over all cases, in milliseconds.
    pub fn average_latency_ms(&self) -> f64 {
        if self.individual_results.is_empty() {
            return 0.0;
        }
        let total: f64 = self.individual_results.iter().map(|r| r.latency_ms).sum();
        total / self.individual_results.len() as f64
    }
}

/// Lifecycle of a dataset evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Complete,
    Failed,
}

/// Orchestrates RAG query, judge and retrieval scoring per test case.
///
/// Cases run strictly one after another. The first failing case aborts the
/// run; its error names the case and the stage that failed.
pub struct Evaluator<'a> {
    rag: &'a dyn RagQuery,
    judge: Box<dyn Judge>,
    config: EvaluationConfig,
    state: RunState,
}

impl<'a> Evaluator<'a> {
    /// Build the configured judge and an evaluator around it.
    ///
    /// Fails before any case runs if the judge cannot be constructed, for
    /// instance when the hosted judge has no API key.
    pub fn new(rag: &'a dyn RagQuery, config: EvaluationConfig) -> Result<Self> {
        let judge = build_judge(&config.judge)?;
        Ok(Self::with_judge(rag, judge, config))
    }

    pub fn with_judge(
        rag: &'a dyn RagQuery,
        judge: Box<dyn Judge>,
        config: EvaluationConfig,
    ) -> Self {
        Self {
            rag,
            judge,
            config,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Evaluate one test case: query, judge, and score retrieval.
    pub async fn evaluate_single(&self, test_case: &TestCase) -> Result<EvaluationResult> {
        let id = test_case.id.as_str();

        let start = Instant::now();
        let details = self
            .rag
            .query_with_details(&test_case.question)
            .await
            .map_err(|e| e.in_case(id, EvalStage::RagQuery))?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let generation_metrics = self
            .judge
            .evaluate_generation(
                &test_case.question,
                &test_case.expected_answer,
                &details.answer,
            )
            .await
            .map_err(|e| e.in_case(id, EvalStage::Judge))?;

        let retrieval_metrics =
            RetrievalEvalResult::calculate(&details.retrieved_pages, test_case.expected_pages());

        tracing::debug!(
            test_case = id,
            latency_ms,
            overall = generation_metrics.overall_score,
            hit = retrieval_metrics.hit,
            "test case scored"
        );

        Ok(EvaluationResult {
            test_case_id: test_case.id.clone(),
            question: test_case.question.clone(),
            generated_answer: details.answer,
            expected_answer: test_case.expected_answer.clone(),
            generation_metrics,
            retrieval_metrics: Some(retrieval_metrics),
            latency_ms,
            metadata: test_case.metadata.clone(),
        })
    }

    /// Evaluate every case of the dataset in order.
    pub async fn evaluate_dataset(&mut self, dataset: &TestDataset) -> Result<EvaluationReport> {
        self.evaluate_dataset_with_progress(dataset, |_, _| {}).await
    }

    /// Like [`Evaluator::evaluate_dataset`], calling `progress(done, total)`
    /// after each case.
    pub async fn evaluate_dataset_with_progress<F>(
        &mut self,
        dataset: &TestDataset,
        mut progress: F,
    ) -> Result<EvaluationReport>
    where
        F: FnMut(usize, usize),
    {
        self.state = RunState::Running;
        tracing::info!(
            dataset = %dataset.dataset_name,
            cases = dataset.len(),
            judge = self.judge.model_name(),
            "starting evaluation"
        );

        match self.run(dataset, &mut progress).await {
            Ok(report) => {
                self.state = RunState::Complete;
                tracing::info!(cases = report.total_test_cases, "evaluation complete");
                Ok(report)
            }
            Err(e) => {
                self.state = RunState::Failed;
                tracing::error!(error = %e, "evaluation aborted");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        dataset: &TestDataset,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<EvaluationReport> {
        let total = dataset.len();
        let mut generation_agg = GenerationMetricsAggregator::new();
        let mut retrieval_agg = RetrievalMetricsAggregator::new();
        let mut results = Vec::with_capacity(total);

        for (i, test_case) in dataset.iter().enumerate() {
            let result = match self.resumed(test_case)? {
                Some(result) => result,
                None => {
                    let result = self.evaluate_single(test_case).await?;
                    if self.config.save_intermediate {
                        save_checkpoint(&self.config.output_dir, &result)
                            .map_err(|e| e.in_case(&test_case.id, EvalStage::Checkpoint))?;
                    }
                    result
                }
            };

            generation_agg.add_result(result.generation_metrics.clone());
            retrieval_agg.add_result(
                result
                    .retrieval_metrics
                    .clone()
                    .unwrap_or_else(|| RetrievalEvalResult::calculate(&[], &[])),
            );
            results.push(result);
            progress(i + 1, total);
        }

        Ok(EvaluationReport {
            dataset_name: dataset.dataset_name.clone(),
            total_test_cases: total,
            aggregate_generation_metrics: generation_agg.aggregate(),
            aggregate_retrieval_metrics: retrieval_agg.aggregate(),
            individual_results: results,
            evaluation_config: self.snapshot(),
            timestamp: Utc::now(),
        })
    }

    /// Checkpointed result for the case, when resuming.
    ///
    /// A checkpoint is reused only if it was written for the same question
    /// and reference answer. Retrieval scores are recomputed from the stored
    /// ranking when the expected pages changed since.
    fn resumed(&self, test_case: &TestCase) -> Result<Option<EvaluationResult>> {
        if !self.config.resume {
            return Ok(None);
        }

        let loaded = load_checkpoint(&self.config.output_dir, &test_case.id)
            .map_err(|e| e.in_case(&test_case.id, EvalStage::Checkpoint))?;

        let mut result = match loaded {
            Some(result) => result,
            None => return Ok(None),
        };

        if result.test_case_id != test_case.id {
            // Distinct ids can share a sanitized file name.
            tracing::warn!(
                test_case = %test_case.id,
                checkpoint = %result.test_case_id,
                "checkpoint belongs to another test case, re-running"
            );
            return Ok(None);
        }

        if result.question != test_case.question
            || result.expected_answer != test_case.expected_answer
        {
            tracing::warn!(
                test_case = %test_case.id,
                "test case changed since checkpoint, re-running"
            );
            return Ok(None);
        }

        let expected = test_case.expected_pages();
        let rescored = result
            .retrieval_metrics
            .as_ref()
            .filter(|r| r.expected_pages != expected)
            .map(|r| RetrievalEvalResult::calculate(&r.retrieved_pages, expected));
        if let Some(retrieval) = rescored {
            tracing::info!(
                test_case = %test_case.id,
                "expected pages changed since checkpoint, rescoring retrieval"
            );
            result.retrieval_metrics = Some(retrieval);
        }

        tracing::info!(test_case = %test_case.id, "resumed from checkpoint");
        Ok(Some(result))
    }

    fn snapshot(&self) -> ConfigSnapshot {
        let rag: Option<&RagConfig> = self.rag.rag_config();
        ConfigSnapshot {
            judge_type: self.config.judge.backend.as_str().to_string(),
            judge_model: self.judge.model_name().to_string(),
            output_dir: self.config.output_dir.clone(),
            save_intermediate: self.config.save_intermediate,
            resume: self.config.resume,
            top_k: rag.map(|r| r.default_top_k),
            pages_before: rag.map(|r| r.pages_before),
            pages_after: rag.map(|r| r.pages_after),
        }
    }
}
