//! Error types for the RAG pipeline and its evaluation harness.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, RagError>;

/// Stage of a single test case evaluation, reported when that stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStage {
    RagQuery,
    Judge,
    Checkpoint,
}

impl fmt::Display for EvalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvalStage::RagQuery => "rag_query",
            EvalStage::Judge => "judge",
            EvalStage::Checkpoint => "checkpoint",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while indexing, querying or evaluating.
#[derive(Error, Debug)]
pub enum RagError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file or value error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The LLM endpoint answered with a non-success status or an unusable body.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// The judge answered with something that holds no JSON object.
    #[error("Could not parse JSON from judge response: {snippet}")]
    JudgeParse { snippet: String },

    /// The judge answered with JSON that lacks a usable score field.
    #[error("Judge response has invalid field '{field}': {snippet}")]
    JudgeSchema { field: String, snippet: String },

    /// A required API key is not present in the environment.
    #[error("API key not found in environment variable: {0}")]
    MissingCredential(String),

    /// A query was issued before any document was indexed.
    #[error("Documents must be indexed first. Run the index command.")]
    NotIndexed,

    /// Vector database error.
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// A document source with an extension we cannot index.
    #[error("Unsupported file '{0}'")]
    UnsupportedFile(PathBuf),

    /// A single test case failed; the whole evaluation run is aborted.
    #[error("Evaluation of test case '{test_case_id}' failed at stage {stage}: {source}")]
    Evaluation {
        test_case_id: String,
        stage: EvalStage,
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a parse error that keeps the first 200 characters of the raw response.
    pub fn judge_parse(response: &str) -> Self {
        Self::JudgeParse {
            snippet: response.chars().take(200).collect(),
        }
    }

    /// Wrap an error with the test case and stage it came from.
    pub fn in_case(self, test_case_id: impl Into<String>, stage: EvalStage) -> Self {
        Self::Evaluation {
            test_case_id: test_case_id.into(),
            stage,
            source: Box::new(self),
        }
    }

    /// Whether retrying the same request might succeed.
    ///
    /// Transport failures and non-2xx answers are transient; malformed model
    /// output, missing credentials and local errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::Http(_) | RagError::LlmApi(_))
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judge_parse_truncates_snippet() {
        let long = "x".repeat(500);
        match RagError::judge_parse(&long) {
            RagError::JudgeParse { snippet } => assert_eq!(snippet.len(), 200),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(RagError::Http("connection reset".into()).is_transient());
        assert!(RagError::LlmApi("503".into()).is_transient());
        assert!(!RagError::judge_parse("nope").is_transient());
        assert!(!RagError::MissingCredential("OPENAI_API_KEY".into()).is_transient());
    }

    #[test]
    fn test_case_context_in_message() {
        let err = RagError::NotIndexed.in_case("tc-7", EvalStage::RagQuery);
        let msg = err.to_string();
        assert!(msg.contains("tc-7"));
        assert!(msg.contains("rag_query"));
    }
}
