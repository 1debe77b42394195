//! Optional JSON Schema gate for ingested documents.
//!
//! At most one schema is active at a time. A schema is checked against the
//! draft 7 meta-schema and compiled before it replaces the active one, so a
//! malformed schema is reported when it is set rather than as a confusing
//! validation failure later. A rejected schema leaves the previous one in
//! place.
//!
//! With no schema set, every document passes.

use std::path::Path;

use jsonschema::{Draft, Validator};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{SchemaDefinitionError, ValidationError};
use crate::models::{load_value, DocumentInput};

struct ActiveSchema {
    origin: String,
    definition: Value,
    compiled: Validator,
}

/// Holds the active schema and validates documents against it.
#[derive(Default)]
pub struct SchemaValidator {
    active: Option<ActiveSchema>,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema_source())
            .finish()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the schema from a JSON file, or clears it when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaDefinitionError`] if the file cannot be read, is not
    /// JSON, or is not a valid draft 7 schema. The active schema is unchanged.
    pub fn set_schema(&mut self, path: Option<&Path>) -> Result<(), SchemaDefinitionError> {
        let Some(path) = path else {
            self.clear();
            return Ok(());
        };

        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| SchemaDefinitionError::Read {
            origin: origin.clone(),
            source,
        })?;
        let definition: Value =
            serde_json::from_str(&content).map_err(|source| SchemaDefinitionError::Parse {
                origin: origin.clone(),
                source,
            })?;

        self.install(origin, definition)
    }

    /// Sets the schema from an in-memory definition.
    pub fn set_schema_value(&mut self, definition: Value) -> Result<(), SchemaDefinitionError> {
        self.install("<in-memory schema>".to_string(), definition)
    }

    fn install(&mut self, origin: String, definition: Value) -> Result<(), SchemaDefinitionError> {
        let compiled = compile(&origin, &definition)?;
        info!(schema = %origin, "schema set");
        self.active = Some(ActiveSchema {
            origin,
            definition,
            compiled,
        });
        Ok(())
    }

    pub fn clear(&mut self) {
        if let Some(previous) = self.active.take() {
            info!(schema = %previous.origin, "schema cleared");
        }
    }

    pub fn is_schema_set(&self) -> bool {
        self.active.is_some()
    }

    /// Where the active schema came from (file path or in-memory marker).
    pub fn schema_source(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.origin.as_str())
    }

    /// The active schema definition.
    pub fn definition(&self) -> Option<&Value> {
        self.active.as_ref().map(|a| &a.definition)
    }

    /// Validates a document value against the active schema.
    ///
    /// All violations are collected into one [`ValidationError::Mismatch`].
    pub fn validate(&self, doc: &Value) -> Result<(), ValidationError> {
        let Some(active) = &self.active else {
            return Ok(());
        };

        let violations: Vec<String> = active
            .compiled
            .iter_errors(doc)
            .map(|error| error.to_string())
            .collect();

        if violations.is_empty() {
            debug!(schema = %active.origin, "document validated");
            return Ok(());
        }

        Err(ValidationError::Mismatch {
            schema: active.origin.clone(),
            violations: violations.len(),
            message: violations.join("; "),
        })
    }

    /// Validates an input, loading it from disk first if it is a path.
    ///
    /// A file that cannot be loaded yields [`ValidationError::Load`]. With no
    /// schema set the file is not read at all.
    pub fn validate_input(&self, input: &DocumentInput) -> Result<(), ValidationError> {
        if !self.is_schema_set() {
            return Ok(());
        }
        match input {
            DocumentInput::Value(value) => self.validate(value),
            DocumentInput::Path(path) => {
                let value = load_value(path)?;
                self.validate(&value)
            }
        }
    }
}

fn compile(origin: &str, definition: &Value) -> Result<Validator, SchemaDefinitionError> {
    jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(definition)
        .map_err(|e| SchemaDefinitionError::Invalid {
            origin: origin.to_string(),
            message: e.to_string(),
        })
}
