//! Error taxonomy for the ingestion pipeline.
//!
//! Each pipeline stage has its own error type so callers can match on the
//! exact failure instead of inspecting message text. [`InsertError::Duplicate`]
//! is the only variant that the orchestrator does not report as a failure.

use std::path::PathBuf;

use thiserror::Error;

/// A document could not be read or parsed into a field mapping.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {origin}: {source}")]
    Read {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {origin} as structured data: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{origin} holds a JSON {found}, expected an object")]
    NotAnObject { origin: String, found: &'static str },
}

/// A canonical field policy could not be built.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid recognition pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("recognition pattern '{pattern}' does not match canonical field '{canonical}'")]
    CanonicalNotRecognized { canonical: String, pattern: String },
}

/// The document carries no field that maps to the canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing canonical field '{canonical}'")]
pub struct NormalizationError {
    pub canonical: String,
}

/// A schema was rejected before it could become active.
#[derive(Debug, Error)]
pub enum SchemaDefinitionError {
    #[error("could not read schema {origin}: {source}")]
    Read {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse schema {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema {origin} is not a valid draft 7 schema: {message}")]
    Invalid { origin: String, message: String },
}

/// A document failed validation, either while loading or against the schema.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("document validation failed against {schema} ({violations} violation(s)): {message}")]
    Mismatch {
        schema: String,
        violations: usize,
        message: String,
    },
}

impl ValidationError {
    /// Returns true when the document itself could not be loaded.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, ValidationError::Load(_))
    }
}

/// Configuration or secrets resolution failed.
///
/// Every variant names the file (and section where relevant) so an operator
/// can find the misconfiguration without re-running anything.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mode must be \"dev\", \"test\", or \"prod\", not \"{0}\"")]
    InvalidMode(String),

    #[error("HOME is not set; pass an explicit config file")]
    NoHomeDir,

    #[error("cannot read config file {}: {source}", .path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {}: {source}", .path.display())]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no [{section}] section in config file {}", .path.display())]
    MissingSection { section: String, path: PathBuf },

    #[error("no index_keys in [{section}] section of config file {}", .path.display())]
    MissingIndexKeys { section: String, path: PathBuf },

    #[error("no {field} in [{section}] section of config file {}", .path.display())]
    MissingField {
        field: &'static str,
        section: String,
        path: PathBuf,
    },

    #[error("invalid collection name '{name}': use letters, digits and underscores, without a sqlite_ or _mdi_ prefix")]
    InvalidCollection { name: String },

    #[error("no [secrets] section in config file {}", .path.display())]
    MissingSecretsSection { path: PathBuf },

    #[error("no filename key in [secrets] section of config file {}", .path.display())]
    MissingSecretsFilename { path: PathBuf },

    #[error("secrets file {} does not exist", .path.display())]
    SecretsNotFound { path: PathBuf },

    #[error("cannot read secrets file {}: {source}", .path.display())]
    ReadSecrets {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse secrets file {}: {source}", .path.display())]
    ParseSecrets {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no [{section}] section in secrets file {}", .path.display())]
    MissingSecretsModeSection { section: String, path: PathBuf },

    #[error("no password in [{section}] section of secrets file {}", .path.display())]
    MissingPassword { section: String, path: PathBuf },
}

/// The store could not be configured, reached, or written to.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not open store {target}: {message}")]
    Open { target: String, message: String },

    #[error("could not create index on collection '{collection}': {message}")]
    Index { collection: String, message: String },

    #[error("cannot ingest document into '{collection}': {message}")]
    Insert { collection: String, message: String },
}

/// Result of a failed `Store::insert`.
#[derive(Debug, Error)]
pub enum InsertError {
    /// Another document already holds the same uniqueness key.
    #[error("duplicate key {key}")]
    Duplicate { key: String },

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}
