//! Evaluation datasets: questions with reference answers and ground truth pages.

use crate::error::{RagError, Result};
use crate::pages::PageRef;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A single question with its reference answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique within a dataset; also names the checkpoint file.
    pub id: String,
    pub question: String,
    pub expected_answer: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Pages that answer the question, used to score retrieval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_pages: Option<Vec<PageRef>>,
}

impl TestCase {
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        expected_answer: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            expected_answer: expected_answer.into(),
            metadata: serde_json::Map::new(),
            expected_pages: None,
        }
    }

    pub fn with_expected_pages(mut self, pages: Vec<PageRef>) -> Self {
        self.expected_pages = Some(pages);
        self
    }

    /// Ground truth pages, empty when none were given.
    pub fn expected_pages(&self) -> &[PageRef] {
        self.expected_pages.as_deref().unwrap_or(&[])
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_name() -> String {
    "Unnamed".to_string()
}

/// An ordered collection of test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDataset {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_name")]
    pub dataset_name: String,
    #[serde(default)]
    pub description: String,
    pub test_cases: Vec<TestCase>,
}

impl TestDataset {
    /// Create a new empty dataset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            dataset_name: name.into(),
            description: String::new(),
            test_cases: Vec::new(),
        }
    }

    pub fn add_case(&mut self, case: TestCase) {
        self.test_cases.push(case);
    }

    pub fn len(&self) -> usize {
        self.test_cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TestCase> {
        self.test_cases.iter()
    }

    /// Number of cases that carry ground truth pages.
    pub fn cases_with_ground_truth(&self) -> usize {
        self.test_cases
            .iter()
            .filter(|tc| !tc.expected_pages().is_empty())
            .count()
    }

    /// Load from a JSON file.
    pub fn from_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            RagError::Serialization(format!("Failed to parse dataset {}: {}", path.display(), e))
        })
    }

    /// Save to a JSON file.
    pub fn to_json(&self, path: &Path) -> Result<()> {
        crate::persistence::save_json(self, path)
    }
}

impl<'a> IntoIterator for &'a TestDataset {
    type Item = &'a TestCase;
    type IntoIter = std::slice::Iter<'a, TestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.test_cases.iter()
    }
}
