//! Retrieval and generation quality metrics.

use crate::pages::PageRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Aggregate metric name to mean value. Ordered so reports are stable.
pub type MetricMap = BTreeMap<String, f64>;

/// Retrieval quality for a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalEvalResult {
    /// Pages in rank order.
    pub retrieved_pages: Vec<PageRef>,
    /// Ground truth pages.
    pub expected_pages: Vec<PageRef>,
    /// At least one expected page was retrieved.
    pub hit: bool,
    /// Share of expected pages that were retrieved.
    pub recall: f64,
    /// Share of retrieved pages that are expected.
    pub precision: f64,
    /// Reciprocal rank of the first expected page in the retrieved list.
    pub mrr: f64,
}

impl RetrievalEvalResult {
    /// Score retrieved pages against ground truth.
    ///
    /// Without ground truth the query cannot be scored and every metric is
    /// fixed at zero with `hit == false`, whatever was retrieved.
    pub fn calculate(retrieved_pages: &[PageRef], expected_pages: &[PageRef]) -> Self {
        if expected_pages.is_empty() {
            return Self {
                retrieved_pages: retrieved_pages.to_vec(),
                expected_pages: Vec::new(),
                hit: false,
                recall: 0.0,
                precision: 0.0,
                mrr: 0.0,
            };
        }

        let retrieved_set: HashSet<&PageRef> = retrieved_pages.iter().collect();
        let expected_set: HashSet<&PageRef> = expected_pages.iter().collect();
        let hits = retrieved_set.intersection(&expected_set).count();

        let recall = hits as f64 / expected_set.len() as f64;
        let precision = if retrieved_set.is_empty() {
            0.0
        } else {
            hits as f64 / retrieved_set.len() as f64
        };

        let mrr = retrieved_pages
            .iter()
            .position(|page| expected_set.contains(page))
            .map(|idx| 1.0 / (idx + 1) as f64)
            .unwrap_or(0.0);

        Self {
            retrieved_pages: retrieved_pages.to_vec(),
            expected_pages: expected_pages.to_vec(),
            hit: hits > 0,
            recall,
            precision,
            mrr,
        }
    }

    /// Whether this query carried ground truth.
    pub fn is_scorable(&self) -> bool {
        !self.expected_pages.is_empty()
    }
}

/// Collects per-query retrieval results and reduces them to dataset means.
#[derive(Debug, Default)]
pub struct RetrievalMetricsAggregator {
    results: Vec<RetrievalEvalResult>,
}

impl RetrievalMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: RetrievalEvalResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Means over the queries that had ground truth.
    ///
    /// `retrieval_coverage` is the share of all queries that had ground truth.
    /// No results at all gives an empty map; results without any ground truth
    /// give all-zero metrics.
    pub fn aggregate(&self) -> MetricMap {
        let mut metrics = MetricMap::new();
        if self.results.is_empty() {
            return metrics;
        }

        let valid: Vec<&RetrievalEvalResult> =
            self.results.iter().filter(|r| r.is_scorable()).collect();

        if valid.is_empty() {
            for name in [
                "hit_rate",
                "mean_recall",
                "mean_precision",
                "mean_mrr",
                "retrieval_coverage",
            ] {
                metrics.insert(name.to_string(), 0.0);
            }
            return metrics;
        }

        let n = valid.len() as f64;
        let hit_count = valid.iter().filter(|r| r.hit).count() as f64;

        metrics.insert("hit_rate".into(), hit_count / n);
        metrics.insert("mean_recall".into(), valid.iter().map(|r| r.recall).sum::<f64>() / n);
        metrics.insert(
            "mean_precision".into(),
            valid.iter().map(|r| r.precision).sum::<f64>() / n,
        );
        metrics.insert("mean_mrr".into(), valid.iter().map(|r| r.mrr).sum::<f64>() / n);
        metrics.insert("retrieval_coverage".into(), n / self.results.len() as f64);
        metrics
    }
}

/// Judge scores for one generated answer. Every score lies in `[1, 5]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationEvalResult {
    pub correctness: f64,
    pub completeness: f64,
    pub relevance: f64,
    pub coherence: f64,
    pub overall_score: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faithfulness_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupported_claims: Option<Vec<String>>,
}

/// Lowest and highest judge score.
pub const SCORE_RANGE: (f64, f64) = (1.0, 5.0);

/// Clamp a raw judge score into [`SCORE_RANGE`].
pub fn clamp_score(score: f64) -> f64 {
    score.clamp(SCORE_RANGE.0, SCORE_RANGE.1)
}

/// Collects judge scores and reduces them to dataset means.
#[derive(Debug, Default)]
pub struct GenerationMetricsAggregator {
    results: Vec<GenerationEvalResult>,
}

impl GenerationMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: GenerationEvalResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Mean of each judged dimension. `mean_faithfulness` is included only
    /// when at least one result carries a faithfulness score.
    pub fn aggregate(&self) -> MetricMap {
        let mut metrics = MetricMap::new();
        if self.results.is_empty() {
            return metrics;
        }

        let n = self.results.len() as f64;
        let mean =
            |f: fn(&GenerationEvalResult) -> f64| self.results.iter().map(f).sum::<f64>() / n;

        metrics.insert("mean_correctness".into(), mean(|r| r.correctness));
        metrics.insert("mean_completeness".into(), mean(|r| r.completeness));
        metrics.insert("mean_relevance".into(), mean(|r| r.relevance));
        metrics.insert("mean_coherence".into(), mean(|r| r.coherence));
        metrics.insert("mean_overall_score".into(), mean(|r| r.overall_score));

        let faithfulness: Vec<f64> = self
            .results
            .iter()
            .filter_map(|r| r.faithfulness_score)
            .collect();
        if !faithfulness.is_empty() {
            metrics.insert(
                "mean_faithfulness".into(),
                faithfulness.iter().sum::<f64>() / faithfulness.len() as f64,
            );
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(refs: &[(u32, u32)]) -> Vec<PageRef> {
        refs.iter().copied().map(PageRef::from).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn gen_result(overall: f64, faithfulness: Option<f64>) -> GenerationEvalResult {
        GenerationEvalResult {
            correctness: overall,
            completeness: overall,
            relevance: 5.0,
            coherence: 4.0,
            overall_score: overall,
            reasoning: "ok".to_string(),
            faithfulness_score: faithfulness,
            unsupported_claims: None,
        }
    }

    #[test]
    fn test_partial_hit_metrics() {
        let result =
            RetrievalEvalResult::calculate(&pages(&[(1, 1), (2, 3), (2, 4)]), &pages(&[(2, 3)]));
        assert!(result.hit);
        assert!(approx(result.recall, 1.0));
        assert!(approx(result.precision, 1.0 / 3.0));
        assert!(approx(result.mrr, 0.5));
    }

    #[test]
    fn test_no_ground_truth_is_not_scorable() {
        let result = RetrievalEvalResult::calculate(&pages(&[(1, 1)]), &[]);
        assert!(!result.hit);
        assert_eq!(result.recall, 0.0);
        assert_eq!(result.precision, 0.0);
        assert_eq!(result.mrr, 0.0);
        assert!(!result.is_scorable());
        assert_eq!(result.retrieved_pages, pages(&[(1, 1)]));
    }

    #[test]
    fn test_miss() {
        let result = RetrievalEvalResult::calculate(&pages(&[(0, 1), (0, 2)]), &pages(&[(0, 9)]));
        assert!(!result.hit);
        assert_eq!(result.recall, 0.0);
        assert_eq!(result.precision, 0.0);
        assert_eq!(result.mrr, 0.0);
    }

    #[test]
    fn test_empty_retrieval_with_ground_truth() {
        let result = RetrievalEvalResult::calculate(&[], &pages(&[(0, 1)]));
        assert!(!result.hit);
        assert_eq!(result.precision, 0.0);
        assert_eq!(result.recall, 0.0);
    }

    #[test]
    fn test_mrr_uses_first_shared_page() {
        let retrieved = pages(&[(0, 1), (0, 2), (0, 3), (0, 4)]);
        let result = RetrievalEvalResult::calculate(&retrieved, &pages(&[(0, 4), (0, 3)]));
        assert!(approx(result.mrr, 1.0 / 3.0));
        assert!(approx(result.recall, 1.0));
        assert!(approx(result.precision, 0.5));
    }

    #[test]
    fn test_duplicates_counted_once() {
        let retrieved = pages(&[(0, 2), (0, 2), (0, 5)]);
        let result = RetrievalEvalResult::calculate(&retrieved, &pages(&[(0, 2), (0, 2), (0, 3)]));
        assert!(approx(result.recall, 0.5));
        assert!(approx(result.precision, 0.5));
        assert!(approx(result.mrr, 1.0));
    }

    #[test]
    fn test_aggregate_only_over_scorable_queries() {
        let mut agg = RetrievalMetricsAggregator::new();
        agg.add_result(RetrievalEvalResult::calculate(&pages(&[(0, 1)]), &pages(&[(0, 1)])));
        agg.add_result(RetrievalEvalResult::calculate(&pages(&[(0, 5)]), &[]));

        let metrics = agg.aggregate();
        assert!(approx(metrics["retrieval_coverage"], 0.5));
        assert!(approx(metrics["hit_rate"], 1.0));
        assert!(approx(metrics["mean_recall"], 1.0));
        assert!(approx(metrics["mean_precision"], 1.0));
        assert!(approx(metrics["mean_mrr"], 1.0));
    }

    #[test]
    fn test_aggregate_without_ground_truth_is_all_zero() {
        let mut agg = RetrievalMetricsAggregator::new();
        agg.add_result(RetrievalEvalResult::calculate(&pages(&[(0, 1)]), &[]));
        agg.add_result(RetrievalEvalResult::calculate(&[], &[]));

        let metrics = agg.aggregate();
        assert_eq!(metrics.len(), 5);
        assert!(metrics.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(RetrievalMetricsAggregator::new().aggregate().is_empty());
        assert!(GenerationMetricsAggregator::new().aggregate().is_empty());
    }

    #[test]
    fn test_generation_means() {
        let mut agg = GenerationMetricsAggregator::new();
        agg.add_result(gen_result(4.0, None));
        agg.add_result(gen_result(2.0, None));
        assert_eq!(agg.len(), 2);

        let metrics = agg.aggregate();
        assert!(approx(metrics["mean_overall_score"], 3.0));
        assert!(approx(metrics["mean_correctness"], 3.0));
        assert!(approx(metrics["mean_relevance"], 5.0));
        assert!(approx(metrics["mean_coherence"], 4.0));
        assert!(!metrics.contains_key("mean_faithfulness"));
    }

    #[test]
    fn test_faithfulness_mean_over_present_scores() {
        let mut agg = GenerationMetricsAggregator::new();
        agg.add_result(gen_result(4.0, Some(5.0)));
        agg.add_result(gen_result(4.0, None));
        agg.add_result(gen_result(4.0, Some(3.0)));

        let metrics = agg.aggregate();
        assert!(approx(metrics["mean_faithfulness"], 4.0));
    }

    #[test]
    fn test_optional_fields_skipped_in_json() {
        let json = serde_json::to_value(gen_result(3.0, None)).unwrap();
        assert!(json.get("faithfulness_score").is_none());
        assert!(json.get("unsupported_claims").is_none());
        assert_eq!(json["overall_score"], 3.0);
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(0.0), 1.0);
        assert_eq!(clamp_score(9.0), 5.0);
        assert_eq!(clamp_score(3.5), 3.5);
    }
}
