//! Ingestion pipeline orchestration.
//!
//! Sequences load → normalize → validate → insert for each document and
//! folds every result into an [`IngestOutcome`]. The pipeline stops at the
//! first failing stage; nothing is inserted after a normalization or
//! validation failure. A duplicate key is reported as
//! [`IngestOutcome::DuplicateSkipped`], not as a failure, so re-running a
//! batch over already-ingested data is harmless.
//!
//! # Shared state
//!
//! An [`IngestSession`] owns the active schema and the store handle. Setting
//! the schema takes an exclusive lock; validation takes a shared lock that is
//! released before the insert is awaited. Wrap the session in an `Arc` to
//! ingest from many tasks at once.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Mode;
use crate::connector;
use crate::error::{ConnectorError, InsertError, SchemaDefinitionError, ValidationError};
use crate::models::{Document, DocumentInput, IngestOutcome, Stage};
use crate::normalize::{CanonicalFieldPolicy, KeyNormalizer};
use crate::schema::SchemaValidator;
use crate::store::Store;

/// Normalizer, schema and store handle for one ingestion session.
pub struct IngestSession {
    normalizer: KeyNormalizer,
    schema: RwLock<SchemaValidator>,
    store: Arc<dyn Store>,
}

impl IngestSession {
    /// A session over `store` with the default `archived_path` policy and no schema.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_policy(store, CanonicalFieldPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn Store>, policy: CanonicalFieldPolicy) -> Self {
        Self {
            normalizer: KeyNormalizer::new(policy),
            schema: RwLock::new(SchemaValidator::new()),
            store,
        }
    }

    /// Resolves configuration for `mode` and connects to the configured store.
    pub async fn open(
        mode: Mode,
        config_path: Option<&Path>,
        secrets_path: Option<&Path>,
    ) -> Result<Self, ConnectorError> {
        let store = connector::connect(mode, config_path, secrets_path).await?;
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn normalizer(&self) -> &KeyNormalizer {
        &self.normalizer
    }

    /// Sets the schema from a file, or clears it with `None`.
    ///
    /// On error the previously active schema stays in force.
    pub fn set_schema(&self, path: Option<&Path>) -> Result<(), SchemaDefinitionError> {
        self.schema
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_schema(path)
    }

    pub fn set_schema_value(&self, definition: Value) -> Result<(), SchemaDefinitionError> {
        self.schema
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_schema_value(definition)
    }

    pub fn is_schema_set(&self) -> bool {
        self.read_schema().is_schema_set()
    }

    /// Validates a document or file against the active schema without ingesting it.
    pub fn validate(&self, input: &DocumentInput) -> Result<(), ValidationError> {
        self.read_schema().validate_input(input)
    }

    fn read_schema(&self) -> RwLockReadGuard<'_, SchemaValidator> {
        self.schema.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ingests one document given as a value or a file path.
    pub async fn ingest(&self, input: impl Into<DocumentInput>) -> IngestOutcome {
        let input = input.into();
        let label = input.label();

        let mut doc = match input.load() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(source = %label, error = %e, "load failed");
                return IngestOutcome::failure(Stage::Load, e.to_string());
            }
        };

        let outcome = self.ingest_document(&mut doc).await;
        debug!(source = %label, %outcome, "ingest finished");
        outcome
    }

    /// Ingests an already-loaded document.
    ///
    /// `doc` is normalized in place, so its fields may be renamed even when a
    /// later stage fails.
    pub async fn ingest_document(&self, doc: &mut Document) -> IngestOutcome {
        if let Err(e) = self.normalizer.normalize(doc) {
            warn!(error = %e, "normalization failed");
            return IngestOutcome::failure(
                Stage::Normalize,
                format!("no canonical identifying field: {}", e),
            );
        }

        if let Err(e) = self.validate_document(doc) {
            warn!(error = %e, "validation failed");
            return IngestOutcome::failure(Stage::Validate, e.to_string());
        }

        match self.store.insert(doc).await {
            Ok(()) => IngestOutcome::Success,
            Err(InsertError::Duplicate { key }) => {
                warn!(collection = self.store.collection(), %key, "duplicate key, skipped");
                IngestOutcome::DuplicateSkipped
            }
            Err(InsertError::Connector(e)) => {
                warn!(error = %e, "insert failed");
                IngestOutcome::failure(Stage::Insert, e.to_string())
            }
        }
    }

    fn validate_document(&self, doc: &mut Document) -> Result<(), ValidationError> {
        let schema = self.read_schema();
        if !schema.is_schema_set() {
            return Ok(());
        }
        let value = Value::Object(std::mem::take(doc));
        let result = schema.validate(&value);
        if let Value::Object(map) = value {
            *doc = map;
        }
        result
    }

    /// Ingests each input in order and tallies the outcomes.
    pub async fn ingest_all<I, T>(&self, inputs: I) -> IngestReport
    where
        I: IntoIterator<Item = T>,
        T: Into<DocumentInput>,
    {
        let mut report = IngestReport::default();
        for input in inputs {
            let input = input.into();
            let label = input.label();
            let outcome = self.ingest(input).await;
            report.record(label, outcome);
        }
        report
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub succeeded: u64,
    pub duplicates: u64,
    pub failures: Vec<FailedDocument>,
}

/// One document that did not make it into the store.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub source: String,
    pub stage: Stage,
    pub reason: String,
}

impl IngestReport {
    pub fn record(&mut self, source: impl Into<String>, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Success => self.succeeded += 1,
            IngestOutcome::DuplicateSkipped => self.duplicates += 1,
            IngestOutcome::Failure { stage, reason } => self.failures.push(FailedDocument {
                source: source.into(),
                stage,
                reason,
            }),
        }
    }

    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    pub fn total(&self) -> u64 {
        self.succeeded + self.duplicates + self.failed()
    }

    /// True when nothing failed. Duplicates do not count as failures.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Paths in `dir` matching the default document globs, then ingested in sorted order.
pub async fn ingest_dir(session: &IngestSession, dir: &Path) -> anyhow::Result<IngestReport> {
    let files: Vec<PathBuf> =
        crate::scan::scan_paths(&[dir.to_path_buf()], &crate::scan::ScanOptions::default())?;
    Ok(session.ingest_all(files).await)
}
