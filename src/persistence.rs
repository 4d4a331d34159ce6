//! Persistence helpers: pretty JSON files and per-test-case checkpoints.
//!
//! A checkpoint is written for every evaluated test case as soon as it is
//! scored, so an interrupted run can be audited or resumed.

use crate::error::{RagError, Result};
use crate::eval::EvaluationResult;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Save a value as pretty-printed JSON, creating parent directories.
pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
        }
    }

    let data = serde_json::to_string_pretty(value)
        .map_err(|e| RagError::Serialization(e.to_string()))?;

    fs::write(path, data).map_err(|e| RagError::io(path, e))?;

    Ok(())
}

/// Load a value from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    serde_json::from_str(&data).map_err(|e| {
        RagError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// File name used for a test case checkpoint.
///
/// Path separators in the id are replaced so every checkpoint lands directly
/// in the output directory.
pub fn checkpoint_file_name(test_case_id: &str) -> String {
    let safe: String = test_case_id
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}.json", safe)
}

/// Full checkpoint path for a test case.
pub fn checkpoint_path(output_dir: &Path, test_case_id: &str) -> PathBuf {
    output_dir.join(checkpoint_file_name(test_case_id))
}

/// Write the checkpoint for one evaluated test case.
pub fn save_checkpoint(output_dir: &Path, result: &EvaluationResult) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).map_err(|e| RagError::io(output_dir, e))?;
    let path = checkpoint_path(output_dir, &result.test_case_id);
    save_json(result, &path)?;
    Ok(path)
}

/// Load the checkpoint for a test case, if one was written.
pub fn load_checkpoint(output_dir: &Path, test_case_id: &str) -> Result<Option<EvaluationResult>> {
    let path = checkpoint_path(output_dir, test_case_id);
    if !path.is_file() {
        return Ok(None);
    }
    load_json(&path).map(Some)
}
