//! # Metadata Ingester CLI (`mdi`)
//!
//! The `mdi` binary drives the ingestion pipeline from the command line:
//! installing the collection index, checking configuration, validating
//! documents against a schema, and ingesting files or directories.
//!
//! ## Usage
//!
//! ```bash
//! mdi --config ~/ingester_config.toml --secrets ~/ingester_secrets.toml --mode prod <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mdi init` | Connect and install the collection's uniqueness index |
//! | `mdi check-config` | Resolve config and secrets, print the connection |
//! | `mdi validate` | Validate documents against a schema, no store needed |
//! | `mdi ingest` | Ingest files or directories |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a directory of run records into the dev store
//! mdi ingest runs/
//!
//! # Gate on a schema, but only report what would happen
//! mdi --mode prod ingest --schema gt-schema.json --dry-run runs/
//!
//! # Machine-readable logs
//! RUST_LOG=debug mdi --log-format json ingest runs/
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use metadata_ingester::config::Mode;
use metadata_ingester::connector;
use metadata_ingester::ingest::{IngestReport, IngestSession};
use metadata_ingester::models::DocumentInput;
use metadata_ingester::scan::{self, ScanOptions};
use metadata_ingester::schema::SchemaValidator;
use metadata_ingester::store::{InMemoryStore, Store};

/// Metadata Ingester: normalize, validate, and idempotently store
/// metadata documents.
///
/// Connection settings come from a TOML file with one `[store.<mode>]`
/// section per deployment mode. Defaults to `$HOME/ingester_config.toml`.
#[derive(Parser)]
#[command(
    name = "mdi",
    about = "Normalize, validate, and idempotently store metadata documents",
    version
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Secrets file holding the password. Overrides `[secrets] filename`.
    #[arg(long, global = true)]
    secrets: Option<PathBuf>,

    /// Deployment mode selecting the `[store.<mode>]` section.
    #[arg(long, global = true, value_enum, default_value_t = Mode::Dev)]
    mode: Mode,

    /// Log output format. Verbosity follows `RUST_LOG` (default `info`).
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the store and install the uniqueness index.
    ///
    /// Idempotent. Fails if the collection already exists with different
    /// index keys.
    Init,

    /// Resolve configuration and secrets and print the connection.
    ///
    /// The password is never printed. The store is not opened.
    CheckConfig,

    /// Validate documents against a JSON Schema without ingesting them.
    Validate {
        /// JSON Schema (draft 7) file.
        #[arg(long)]
        schema: PathBuf,

        /// Document files or directories.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ingest documents from files or directories.
    ///
    /// Directories are walked recursively. Documents whose key is already
    /// stored are skipped. Exits non-zero if any document failed.
    Ingest {
        /// Validate every document against this JSON Schema first.
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Run the pipeline against an in-memory store; nothing is written.
        #[arg(long)]
        dry_run: bool,

        /// Glob of files to pick up inside directories (repeatable).
        #[arg(long = "include")]
        include: Vec<String>,

        /// Glob of files to skip inside directories (repeatable).
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Document files or directories.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let source = StoreSource {
        mode: cli.mode,
        config: cli.config.as_deref(),
        secrets: cli.secrets.as_deref(),
    };

    match cli.command {
        Commands::Init => run_init(&source).await?,
        Commands::CheckConfig => run_check_config(&source)?,
        Commands::Validate { schema, paths } => run_validate(&schema, &paths)?,
        Commands::Ingest {
            schema,
            dry_run,
            include,
            exclude,
            paths,
        } => {
            let mut options = ScanOptions {
                exclude_globs: exclude,
                ..Default::default()
            };
            if !include.is_empty() {
                options.include_globs = include;
            }
            run_ingest(&source, schema.as_deref(), dry_run, &options, &paths).await?
        }
    }

    Ok(())
}

/// Where the store configuration comes from.
struct StoreSource<'a> {
    mode: Mode,
    config: Option<&'a Path>,
    secrets: Option<&'a Path>,
}

async fn run_init(source: &StoreSource<'_>) -> Result<()> {
    let store = connector::connect(source.mode, source.config, source.secrets)
        .await
        .with_context(|| format!("cannot initialize {} store", source.mode))?;
    println!(
        "collection '{}' ready (index on {})",
        store.collection(),
        store.index_keys().join(", ")
    );
    Ok(())
}

fn run_check_config(source: &StoreSource<'_>) -> Result<()> {
    let descriptor = connector::resolve(source.mode, source.config, source.secrets)
        .with_context(|| format!("invalid {} configuration", source.mode))?;
    println!("mode:        {}", source.mode);
    println!("backend:     {}", descriptor.backend);
    println!("address:     {}:{}", descriptor.address, descriptor.port);
    println!("username:    {}", descriptor.username);
    println!("auth source: {}", descriptor.auth_source);
    println!("password:    {}", descriptor.password);
    println!("database:    {}", descriptor.database);
    println!("collection:  {}", descriptor.collection);
    println!("index keys:  {}", descriptor.index_keys.join(", "));
    println!("timeout:     {}s", descriptor.timeout.as_secs());
    println!("ok");
    Ok(())
}

fn run_validate(schema: &Path, paths: &[PathBuf]) -> Result<()> {
    let mut validator = SchemaValidator::new();
    validator
        .set_schema(Some(schema))
        .context("cannot load schema")?;

    let files = scan::scan_paths(paths, &ScanOptions::default())?;
    let mut failed = 0usize;
    for file in &files {
        match validator.validate_input(&DocumentInput::from(file.as_path())) {
            Ok(()) => println!("ok    {}", file.display()),
            Err(e) => {
                failed += 1;
                println!("FAIL  {}: {}", file.display(), e);
            }
        }
    }

    println!("validated {} document(s), {} failed", files.len(), failed);
    if failed > 0 {
        bail!("{} document(s) failed validation", failed);
    }
    Ok(())
}

async fn run_ingest(
    source: &StoreSource<'_>,
    schema: Option<&Path>,
    dry_run: bool,
    options: &ScanOptions,
    paths: &[PathBuf],
) -> Result<()> {
    let store: Arc<dyn Store> = if dry_run {
        let descriptor = connector::resolve(source.mode, source.config, source.secrets)
            .with_context(|| format!("invalid {} configuration", source.mode))?;
        Arc::new(InMemoryStore::new(
            descriptor.collection,
            descriptor.index_keys,
        ))
    } else {
        connector::connect(source.mode, source.config, source.secrets)
            .await
            .with_context(|| format!("cannot connect to {} store", source.mode))?
    };

    let session = IngestSession::new(store);
    if schema.is_some() {
        session.set_schema(schema).context("cannot load schema")?;
    }

    let files = scan::scan_paths(paths, options)?;
    let report = session.ingest_all(files).await;
    print_report(&report, dry_run);

    if !report.is_clean() {
        bail!("{} document(s) failed", report.failed());
    }
    Ok(())
}

fn print_report(report: &IngestReport, dry_run: bool) {
    for failure in &report.failures {
        println!("FAIL  {} [{}] {}", failure.source, failure.stage, failure.reason);
    }
    if dry_run {
        println!("ingest (dry-run)");
    } else {
        println!("ingest");
    }
    println!("  documents: {}", report.total());
    println!("  ingested: {}", report.succeeded);
    println!("  duplicates skipped: {}", report.duplicates);
    println!("  failed: {}", report.failed());
    if report.is_clean() {
        println!("ok");
    }
}
