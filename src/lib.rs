//! # Metadata Ingester
//!
//! Loads scientific metadata documents, normalizes their identifying field,
//! optionally validates them against a JSON Schema, and inserts them into a
//! document store whose uniqueness index makes re-ingestion idempotent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │   Load   │──▶│ Normalize │──▶│ Validate │──▶│  Insert  │
//! │ file/val │   │ canonical │   │  schema  │   │  store   │
//! └──────────┘   └───────────┘   └──────────┘   └────┬─────┘
//!                                                    │
//!                                   ┌────────────────┤
//!                                   ▼                ▼
//!                              ┌──────────┐    ┌──────────┐
//!                              │  SQLite  │    │ In-memory│
//!                              └──────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mdi --mode dev init                          # create collection + index
//! mdi --mode dev check-config                  # resolve config and secrets
//! mdi validate --schema gt-schema.json run.json
//! mdi --mode prod ingest --schema gt-schema.json runs/
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and secrets resolution |
//! | [`connector`] | Config to live store handle |
//! | [`db`] | SQLite connection pool |
//! | [`error`] | Error taxonomy |
//! | [`ingest`] | Pipeline orchestration and batch reports |
//! | [`migrate`] | Collection tables and uniqueness index |
//! | [`models`] | Documents, inputs, outcomes |
//! | [`normalize`] | Canonical field renaming |
//! | [`scan`] | Path expansion for batch runs |
//! | [`schema`] | JSON Schema validation |
//! | [`store`] | Store trait and backends |

pub mod config;
pub mod connector;
pub mod db;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod scan;
pub mod schema;
pub mod store;

pub use error::{ConnectorError, InsertError, LoadError, NormalizationError, ValidationError};
pub use ingest::{IngestReport, IngestSession};
pub use models::{Document, DocumentInput, IngestOutcome, Stage};
