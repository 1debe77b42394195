//! Core data models used throughout the ingester.
//!
//! These types represent the documents that flow through the pipeline and
//! the outcome reported for each of them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::LoadError;

/// A metadata document: an ordered mapping of field names to JSON values.
pub type Document = serde_json::Map<String, Value>;

/// What a caller hands to the pipeline: a value already in memory, or the
/// path of a file holding its JSON serialization.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    Value(Value),
    Path(PathBuf),
}

impl DocumentInput {
    /// Human-readable origin used in logs and failure reports.
    pub fn label(&self) -> String {
        match self {
            DocumentInput::Value(_) => "<in-memory document>".to_string(),
            DocumentInput::Path(path) => path.display().to_string(),
        }
    }

    /// Loads the input into a [`Document`], reading and parsing files as needed.
    pub fn load(self) -> Result<Document, LoadError> {
        match self {
            DocumentInput::Value(value) => into_document(value, "<in-memory document>"),
            DocumentInput::Path(path) => load_document(&path),
        }
    }
}

impl From<Value> for DocumentInput {
    fn from(value: Value) -> Self {
        DocumentInput::Value(value)
    }
}

impl From<Document> for DocumentInput {
    fn from(doc: Document) -> Self {
        DocumentInput::Value(Value::Object(doc))
    }
}

impl From<PathBuf> for DocumentInput {
    fn from(path: PathBuf) -> Self {
        DocumentInput::Path(path)
    }
}

impl From<&Path> for DocumentInput {
    fn from(path: &Path) -> Self {
        DocumentInput::Path(path.to_path_buf())
    }
}

/// Reads a JSON file and returns its top-level object.
pub fn load_value(path: &Path) -> Result<Value, LoadError> {
    let origin = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        origin: origin.clone(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| LoadError::Parse { origin, source })
}

/// Reads a JSON file that must contain a single object.
pub fn load_document(path: &Path) -> Result<Document, LoadError> {
    let value = load_value(path)?;
    into_document(value, &path.display().to_string())
}

/// Unwraps a JSON object, rejecting every other JSON type.
pub fn into_document(value: Value, origin: &str) -> Result<Document, LoadError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(LoadError::NotAnObject {
            origin: origin.to_string(),
            found: json_type_name(&other),
        }),
    }
}

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Pipeline stage at which a document was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Normalize,
    Validate,
    Insert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Normalize => "normalize",
            Stage::Validate => "validate",
            Stage::Insert => "insert",
        };
        f.write_str(name)
    }
}

/// Uniform result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Success,
    /// The store already holds a document with the same uniqueness key.
    DuplicateSkipped,
    Failure { stage: Stage, reason: String },
}

impl IngestOutcome {
    pub fn failure(stage: Stage, reason: impl Into<String>) -> Self {
        IngestOutcome::Failure {
            stage,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IngestOutcome::Success)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::DuplicateSkipped)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, IngestOutcome::Failure { .. })
    }

    /// The failing stage, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            IngestOutcome::Failure { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestOutcome::Success => f.write_str("ingested"),
            IngestOutcome::DuplicateSkipped => f.write_str("duplicate key, skipped"),
            IngestOutcome::Failure { stage, reason } => write!(f, "failed at {}: {}", stage, reason),
        }
    }
}
