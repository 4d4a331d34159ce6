//! End-to-end evaluation runs against an in-memory RAG pipeline.

use async_trait::async_trait;
use colpali_rag::config::{EvaluationConfig, JudgeConfig};
use colpali_rag::eval::{
    EvaluationResult, Evaluator, GenerationEvalResult, HostedJudge, Judge, ReportGenerator,
    RetryPolicy, RunState, TestCase, TestDataset,
};
use colpali_rag::service::{QueryDetails, RagQuery};
use colpali_rag::{EvalStage, PageRef, RagError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Answers from a fixed table keyed by question.
struct TableRag {
    answers: HashMap<String, (String, Vec<PageRef>)>,
}

impl TableRag {
    fn new(rows: Vec<(&str, &str, Vec<(u32, u32)>)>) -> Self {
        let answers = rows
            .into_iter()
            .map(|(q, a, pages)| {
                let pages = pages.into_iter().map(PageRef::from).collect();
                (q.to_string(), (a.to_string(), pages))
            })
            .collect();
        Self { answers }
    }
}

#[async_trait]
impl RagQuery for TableRag {
    async fn query_with_details(&self, question: &str) -> Result<QueryDetails> {
        let (answer, pages) = self
            .answers
            .get(question)
            .cloned()
            .ok_or(RagError::NotIndexed)?;
        Ok(QueryDetails {
            answer,
            expanded_pages: pages.clone(),
            retrieved_pages: pages,
        })
    }
}

/// Replays scripted verdicts in order.
struct ScriptedJudge {
    verdicts: Mutex<VecDeque<Result<GenerationEvalResult>>>,
}

impl ScriptedJudge {
    fn new(verdicts: Vec<Result<GenerationEvalResult>>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
        }
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn evaluate_generation(
        &self,
        _question: &str,
        _expected_answer: &str,
        _generated_answer: &str,
    ) -> Result<GenerationEvalResult> {
        self.verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RagError::LlmApi("script exhausted".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn verdict(score: f64) -> GenerationEvalResult {
    GenerationEvalResult {
        correctness: score,
        completeness: score,
        relevance: score,
        coherence: score,
        overall_score: score,
        reasoning: format!("scored {score}"),
        faithfulness_score: None,
        unsupported_claims: None,
    }
}

fn eval_config(dir: &TempDir) -> EvaluationConfig {
    EvaluationConfig {
        output_dir: dir.path().join("results"),
        ..Default::default()
    }
}

fn two_case_dataset() -> TestDataset {
    let mut dataset = TestDataset::new("manuals");
    dataset.add_case(
        TestCase::new("reset", "How do I reset it?", "Hold power for 10 seconds.")
            .with_expected_pages(vec![PageRef::new(0, 4)]),
    );
    dataset.add_case(TestCase::new(
        "warranty",
        "How long is the warranty?",
        "Two years.",
    ));
    dataset
}

fn two_case_rag() -> TableRag {
    TableRag::new(vec![
        ("How do I reset it?", "Hold the power button.", vec![(0, 4), (0, 7)]),
        ("How long is the warranty?", "Two years.", vec![(1, 1)]),
    ])
}

#[tokio::test]
async fn test_coverage_counts_only_cases_with_ground_truth() {
    let dir = TempDir::new().unwrap();
    let rag = two_case_rag();
    let judge = ScriptedJudge::new(vec![Ok(verdict(4.0)), Ok(verdict(2.0))]);
    let mut evaluator = Evaluator::with_judge(&rag, Box::new(judge), eval_config(&dir));

    let report = evaluator.evaluate_dataset(&two_case_dataset()).await.unwrap();

    assert_eq!(evaluator.state(), RunState::Complete);
    assert_eq!(report.total_test_cases, 2);

    let retrieval = &report.aggregate_retrieval_metrics;
    assert_eq!(retrieval["retrieval_coverage"], 0.5);
    assert_eq!(retrieval["hit_rate"], 1.0);
    assert_eq!(retrieval["mean_recall"], 1.0);
    assert_eq!(retrieval["mean_precision"], 0.5);
    assert_eq!(retrieval["mean_mrr"], 1.0);

    let generation = &report.aggregate_generation_metrics;
    assert_eq!(generation["mean_overall_score"], 3.0);
    assert_eq!(generation["mean_correctness"], 3.0);

    let ids: Vec<_> = report
        .individual_results
        .iter()
        .map(|r| r.test_case_id.as_str())
        .collect();
    assert_eq!(ids, vec!["reset", "warranty"]);
}

#[tokio::test]
async fn test_checkpoints_and_reports_on_disk() {
    let dir = TempDir::new().unwrap();
    let rag = two_case_rag();
    let judge = ScriptedJudge::new(vec![Ok(verdict(5.0)), Ok(verdict(3.0))]);
    let config = eval_config(&dir);
    let results_dir = config.output_dir.clone();
    let mut evaluator = Evaluator::with_judge(&rag, Box::new(judge), config);

    let report = evaluator.evaluate_dataset(&two_case_dataset()).await.unwrap();

    let checkpoint = std::fs::read_to_string(results_dir.join("reset.json")).unwrap();
    let saved: EvaluationResult = serde_json::from_str(&checkpoint).unwrap();
    assert_eq!(saved, report.individual_results[0]);
    let retrieval = saved.retrieval_metrics.unwrap();
    assert!(retrieval.hit);
    assert_eq!(retrieval.expected_pages, vec![PageRef::new(0, 4)]);

    let reports_dir = dir.path().join("reports");
    ReportGenerator::new(&report).save_all(&reports_dir).unwrap();

    let csv = std::fs::read_to_string(reports_dir.join("metrics.csv")).unwrap();
    assert_eq!(csv.lines().count(), 3);
    let markdown = std::fs::read_to_string(reports_dir.join("report.md")).unwrap();
    assert!(markdown.contains("## Aggregate Retrieval Metrics"));
    assert!(markdown.contains("### warranty"));
}

#[tokio::test]
async fn test_judge_failure_aborts_with_case_and_stage() {
    let dir = TempDir::new().unwrap();
    let rag = two_case_rag();
    let judge = ScriptedJudge::new(vec![
        Ok(verdict(4.0)),
        Err(RagError::judge_parse("I think it is fine")),
    ]);
    let config = eval_config(&dir);
    let results_dir = config.output_dir.clone();
    let mut evaluator = Evaluator::with_judge(&rag, Box::new(judge), config);

    let err = evaluator
        .evaluate_dataset(&two_case_dataset())
        .await
        .unwrap_err();

    assert_eq!(evaluator.state(), RunState::Failed);
    match err {
        RagError::Evaluation {
            test_case_id,
            stage,
            source,
        } => {
            assert_eq!(test_case_id, "warranty");
            assert_eq!(stage, EvalStage::Judge);
            assert!(matches!(*source, RagError::JudgeParse { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The first case was checkpointed before the run aborted.
    assert!(results_dir.join("reset.json").exists());
    assert!(!results_dir.join("warranty.json").exists());
}

#[tokio::test]
async fn test_resume_after_failure_only_reruns_missing_cases() {
    let dir = TempDir::new().unwrap();
    let rag = two_case_rag();
    let dataset = two_case_dataset();

    let failing = ScriptedJudge::new(vec![
        Ok(verdict(4.0)),
        Err(RagError::LlmApi("503".to_string())),
    ]);
    let mut first = Evaluator::with_judge(&rag, Box::new(failing), eval_config(&dir));
    assert!(first.evaluate_dataset(&dataset).await.is_err());

    // Only one verdict left in the script: the resumed case must not ask for one.
    let judge = ScriptedJudge::new(vec![Ok(verdict(2.0))]);
    let config = EvaluationConfig {
        resume: true,
        ..eval_config(&dir)
    };
    let mut second = Evaluator::with_judge(&rag, Box::new(judge), config);
    let report = second.evaluate_dataset(&dataset).await.unwrap();

    assert_eq!(report.individual_results[0].generation_metrics.overall_score, 4.0);
    assert_eq!(report.individual_results[1].generation_metrics.overall_score, 2.0);
    assert_eq!(report.aggregate_generation_metrics["mean_overall_score"], 3.0);
}

#[tokio::test]
async fn test_dataset_file_through_hosted_judge() {
    let dir = TempDir::new().unwrap();
    let dataset_path = dir.path().join("dataset.json");
    std::fs::write(
        &dataset_path,
        r#"{
            "dataset_name": "hosted",
            "test_cases": [
                {
                    "id": "tc-1",
                    "question": "How do I reset it?",
                    "expected_answer": "Hold power for 10 seconds.",
                    "expected_pages": [{"doc_id": 0, "page_num": 7}]
                }
            ]
        }"#,
    )
    .unwrap();
    let dataset = TestDataset::from_json(&dataset_path).unwrap();

    let mut server = mockito::Server::new_async().await;
    let verdict_json = "{\"correctness\": \"4\", \"completeness\": 4, \"relevance\": 5, \
                        \"coherence\": 5, \"overall_score\": 9, \"reasoning\": \"Good.\"}";
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "choices": [{"message": {"content": verdict_json}, "finish_reason": "stop"}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let judge_config = JudgeConfig {
        api_base: server.url(),
        ..Default::default()
    };
    let judge = HostedJudge::with_api_key(&judge_config, "sk-test")
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
        });

    let rag = two_case_rag();
    let mut evaluator = Evaluator::with_judge(&rag, Box::new(judge), eval_config(&dir));
    let report = evaluator.evaluate_dataset(&dataset).await.unwrap();

    let result = &report.individual_results[0];
    assert_eq!(result.generation_metrics.correctness, 4.0);
    assert_eq!(result.generation_metrics.overall_score, 5.0);

    let retrieval = result.retrieval_metrics.as_ref().unwrap();
    assert!(retrieval.hit);
    assert_eq!(retrieval.mrr, 0.5);
    assert_eq!(report.aggregate_retrieval_metrics["retrieval_coverage"], 1.0);
    assert_eq!(report.evaluation_config.judge_model, "gpt-4o");
}
