//! Evaluation harness for the RAG pipeline.
//!
//! Each test case is answered through [`RagQuery`](crate::service::RagQuery),
//! scored by an LLM [`Judge`] and, when the case names the pages that hold
//! the answer, scored for retrieval as well. Per-case results are
//! checkpointed and reduced into an [`EvaluationReport`].

pub mod dataset;
pub mod evaluator;
pub mod judge;
pub mod metrics;
pub mod report;

pub use dataset::{TestCase, TestDataset};
pub use evaluator::{ConfigSnapshot, EvaluationReport, EvaluationResult, Evaluator, RunState};
pub use judge::{HostedJudge, Judge, LocalJudge, RetryPolicy, build_judge};
pub use metrics::{
    GenerationEvalResult, GenerationMetricsAggregator, MetricMap, RetrievalEvalResult,
    RetrievalMetricsAggregator,
};
pub use report::ReportGenerator;
