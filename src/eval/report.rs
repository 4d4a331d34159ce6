//! Evaluation reports as JSON, Markdown and CSV.

use super::evaluator::{EvaluationReport, EvaluationResult};
use super::metrics::MetricMap;
use crate::error::{RagError, Result};
use crate::pages::PageRef;
use crate::persistence::save_json;
use std::fs;
use std::path::Path;

/// Longest question prefix written to the CSV.
const CSV_QUESTION_CHARS: usize = 100;

const CSV_HEADER: [&str; 12] = [
    "test_case_id",
    "question",
    "latency_ms",
    "correctness",
    "completeness",
    "relevance",
    "coherence",
    "overall_score",
    "hit",
    "recall",
    "precision",
    "mrr",
];

/// Renders a finished [`EvaluationReport`].
pub struct ReportGenerator<'a> {
    report: &'a EvaluationReport,
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
        }
    }
    fs::write(path, content).map_err(|e| RagError::io(path, e))
}

fn format_pages(pages: &[PageRef]) -> String {
    if pages.is_empty() {
        return "none".to_string();
    }
    pages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn metric_table(lines: &mut Vec<String>, title: &str, metrics: &MetricMap) {
    lines.push(format!("## {title}"));
    lines.push(String::new());
    lines.push("| Metric | Value |".to_string());
    lines.push("|--------|-------|".to_string());
    for (name, value) in metrics {
        lines.push(format!("| {name} | {value:.4} |"));
    }
    lines.push(String::new());
}

impl<'a> ReportGenerator<'a> {
    pub fn new(report: &'a EvaluationReport) -> Self {
        Self { report }
    }

    /// Full report, including both aggregate mappings, as pretty JSON.
    pub fn to_json(&self, path: &Path) -> Result<()> {
        save_json(self.report, path)
    }

    pub fn to_markdown(&self, path: &Path) -> Result<()> {
        write_file(path, &self.render_markdown())
    }

    pub fn to_csv(&self, path: &Path) -> Result<()> {
        write_file(path, &self.render_csv()?)
    }

    /// Write `report.json`, `report.md` and `metrics.csv` into `output_dir`.
    pub fn save_all(&self, output_dir: &Path) -> Result<()> {
        fs::create_dir_all(output_dir).map_err(|e| RagError::io(output_dir, e))?;
        self.to_json(&output_dir.join("report.json"))?;
        self.to_markdown(&output_dir.join("report.md"))?;
        self.to_csv(&output_dir.join("metrics.csv"))?;
        tracing::info!(dir = %output_dir.display(), "reports written");
        Ok(())
    }

    pub fn render_markdown(&self) -> String {
        let report = self.report;
        let mut lines = vec![
            format!("# Evaluation Report: {}", report.dataset_name),
            String::new(),
            format!("**Generated:** {}", report.timestamp.to_rfc3339()),
            format!("**Total Test Cases:** {}", report.total_test_cases),
            format!(
                "**Judge:** {} ({})",
                report.evaluation_config.judge_model, report.evaluation_config.judge_type
            ),
            format!("**Average Latency:** {:.1} ms", report.average_latency_ms()),
            String::new(),
        ];

        metric_table(
            &mut lines,
            "Aggregate Generation Metrics",
            &report.aggregate_generation_metrics,
        );
        if !report.aggregate_retrieval_metrics.is_empty() {
            metric_table(
                &mut lines,
                "Aggregate Retrieval Metrics",
                &report.aggregate_retrieval_metrics,
            );
        }

        lines.push("## Individual Results Summary".to_string());
        lines.push(String::new());
        lines.push(
            "| Test Case | Overall Score | Correctness | Completeness | Hit | Latency (ms) |"
                .to_string(),
        );
        lines.push(
            "|-----------|---------------|-------------|--------------|-----|--------------|"
                .to_string(),
        );
        for r in &report.individual_results {
            let gm = &r.generation_metrics;
            lines.push(format!(
                "| {} | {} | {} | {} | {} | {:.1} |",
                r.test_case_id,
                gm.overall_score,
                gm.correctness,
                gm.completeness,
                hit_label(r),
                r.latency_ms
            ));
        }

        lines.push(String::new());
        lines.push("## Detailed Results".to_string());
        lines.push(String::new());

        for r in &report.individual_results {
            lines.push(format!("### {}", r.test_case_id));
            lines.push(String::new());
            lines.push(format!("**Question:** {}", r.question));
            lines.push(String::new());
            lines.push(format!("**Expected Answer:** {}", r.expected_answer));
            lines.push(String::new());
            lines.push(format!("**Generated Answer:** {}", r.generated_answer));
            lines.push(String::new());
            lines.push(format!("**Reasoning:** {}", r.generation_metrics.reasoning));
            lines.push(String::new());
            if let Some(retrieval) = &r.retrieval_metrics {
                lines.push(format!(
                    "**Retrieved Pages:** {}",
                    format_pages(&retrieval.retrieved_pages)
                ));
                lines.push(String::new());
                if retrieval.is_scorable() {
                    lines.push(format!(
                        "**Expected Pages:** {}",
                        format_pages(&retrieval.expected_pages)
                    ));
                    lines.push(String::new());
                }
            }
            lines.push("---".to_string());
            lines.push(String::new());
        }

        lines.join("\n")
    }

    /// One row per case. Retrieval columns stay empty for cases without
    /// ground truth.
    pub fn render_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(Vec::new());
        writer.write_record(CSV_HEADER).map_err(csv_error)?;

        for r in &self.report.individual_results {
            let gm = &r.generation_metrics;
            let question: String = r.question.chars().take(CSV_QUESTION_CHARS).collect();
            let mut row = vec![
                r.test_case_id.clone(),
                question,
                format!("{:.1}", r.latency_ms),
                gm.correctness.to_string(),
                gm.completeness.to_string(),
                gm.relevance.to_string(),
                gm.coherence.to_string(),
                gm.overall_score.to_string(),
            ];
            match r.retrieval_metrics.as_ref().filter(|m| m.is_scorable()) {
                Some(m) => {
                    row.push(u8::from(m.hit).to_string());
                    row.push(format!("{:.4}", m.recall));
                    row.push(format!("{:.4}", m.precision));
                    row.push(format!("{:.4}", m.mrr));
                }
                None => row.extend(std::iter::repeat_n(String::new(), 4)),
            }
            writer.write_record(&row).map_err(csv_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| RagError::Serialization(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| RagError::Serialization(e.to_string()))
    }
}

fn csv_error(err: csv::Error) -> RagError {
    RagError::Serialization(format!("CSV write failed: {}", err))
}

fn hit_label(result: &EvaluationResult) -> &'static str {
    match result.retrieval_metrics.as_ref().filter(|m| m.is_scorable()) {
        Some(m) if m.hit => "yes",
        Some(_) => "no",
        None => "-",
    }
}
