//! Store connection configuration.
//!
//! Connection settings live in a TOML file with one `[store.<mode>]`
//! section per deployment mode, plus a `[secrets]` section naming a second
//! file that holds the password:
//!
//! ```toml
//! [store.dev]
//! backend = "sqlite"
//! address = "./data"
//! port = 27017
//! username = "curator"
//! auth_source = "admin"
//! database = "metadata"
//! collection = "documents"
//! index_keys = ["archived_path"]
//!
//! [secrets]
//! filename = "ingester_secrets.toml"
//! ```
//!
//! The secrets filename is resolved relative to the config file's directory.
//! The secrets file mirrors the mode sections:
//!
//! ```toml
//! [store.dev]
//! password = "..."
//! ```
//!
//! Every missing piece is reported with its own [`ConfigError`] variant.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default config file name, looked up in `$HOME` when no path is given.
pub const DEFAULT_CONFIG_FILENAME: &str = "ingester_config.toml";

/// Deployment mode selecting the `[store.<mode>]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    Dev,
    Test,
    Prod,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Dev => "dev",
            Mode::Test => "test",
            Mode::Prod => "prod",
        }
    }

    /// Name of the TOML section for this mode, e.g. `store.dev`.
    pub fn section(&self) -> String {
        format!("store.{}", self.as_str())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Mode::Dev),
            "test" => Ok(Mode::Test),
            "prod" => Ok(Mode::Prod),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

/// Store implementation behind the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sqlite => f.write_str("sqlite"),
            Backend::Memory => f.write_str("memory"),
        }
    }
}

/// A password that never appears in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// A fully resolved `[store.<mode>]` section.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: Backend,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub auth_source: String,
    pub database: String,
    pub collection: String,
    pub index_keys: Vec<String>,
    pub timeout_secs: u64,
}

/// Parsed config file for one mode.
#[derive(Debug, Clone)]
pub struct IngesterConfig {
    pub path: PathBuf,
    pub mode: Mode,
    pub store: StoreConfig,
    /// Absolute or config-relative path of the secrets file.
    pub secrets_file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    store: BTreeMap<String, RawStoreSection>,
    secrets: Option<RawSecretsRef>,
}

#[derive(Debug, Deserialize)]
struct RawStoreSection {
    #[serde(default = "default_backend")]
    backend: Backend,
    address: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    auth_source: Option<String>,
    database: Option<String>,
    collection: Option<String>,
    index_keys: Option<IndexKeys>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_backend() -> Backend {
    Backend::Sqlite
}
fn default_timeout_secs() -> u64 {
    30
}

/// `index_keys` accepts a single field name or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexKeys {
    One(String),
    Many(Vec<String>),
}

impl IndexKeys {
    fn into_vec(self) -> Vec<String> {
        let keys = match self {
            IndexKeys::One(key) => vec![key],
            IndexKeys::Many(keys) => keys,
        };
        keys.into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawSecretsRef {
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSecrets {
    #[serde(default)]
    store: BTreeMap<String, RawSecretsSection>,
}

#[derive(Debug, Deserialize)]
struct RawSecretsSection {
    password: Option<String>,
}

/// `$HOME/ingester_config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(DEFAULT_CONFIG_FILENAME))
        .ok_or(ConfigError::NoHomeDir)
}

/// Loads and checks the `[store.<mode>]` and `[secrets]` sections.
///
/// Does not read the secrets file; see [`read_password`].
pub fn load_config(path: &Path, mode: Mode) -> Result<IngesterConfig, ConfigError> {
    load_config_with_secrets(path, mode, None)
}

/// Like [`load_config`], but an explicit `secrets_path` replaces the
/// `[secrets]` section, which then need not exist.
pub fn load_config_with_secrets(
    path: &Path,
    mode: Mode,
    secrets_path: Option<&Path>,
) -> Result<IngesterConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let mut raw: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let section = mode.section();
    let store = raw
        .store
        .remove(mode.as_str())
        .ok_or_else(|| ConfigError::MissingSection {
            section: section.clone(),
            path: path.to_path_buf(),
        })?;

    let index_keys = store
        .index_keys
        .map(IndexKeys::into_vec)
        .filter(|keys| !keys.is_empty())
        .ok_or_else(|| ConfigError::MissingIndexKeys {
            section: section.clone(),
            path: path.to_path_buf(),
        })?;

    let missing = |field: &'static str| ConfigError::MissingField {
        field,
        section: section.clone(),
        path: path.to_path_buf(),
    };

    let store = StoreConfig {
        backend: store.backend,
        address: store.address.ok_or_else(|| missing("address"))?,
        port: store.port.ok_or_else(|| missing("port"))?,
        username: store.username.ok_or_else(|| missing("username"))?,
        auth_source: store.auth_source.ok_or_else(|| missing("auth_source"))?,
        database: store.database.ok_or_else(|| missing("database"))?,
        collection: store.collection.ok_or_else(|| missing("collection"))?,
        index_keys,
        timeout_secs: store.timeout_secs,
    };

    if !is_identifier(&store.collection) {
        return Err(ConfigError::InvalidCollection {
            name: store.collection,
        });
    }

    let secrets_file = match secrets_path {
        Some(secrets_path) => secrets_path.to_path_buf(),
        None => secrets_from_config(path, raw.secrets)?,
    };

    Ok(IngesterConfig {
        path: path.to_path_buf(),
        mode,
        store,
        secrets_file,
    })
}

fn secrets_from_config(path: &Path, secrets: Option<RawSecretsRef>) -> Result<PathBuf, ConfigError> {
    let secrets = secrets.ok_or_else(|| ConfigError::MissingSecretsSection {
        path: path.to_path_buf(),
    })?;
    let filename = secrets
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingSecretsFilename {
            path: path.to_path_buf(),
        })?;

    let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(config_dir.join(filename))
}

/// Reads the password for `mode` from a secrets file.
pub fn read_password(secrets_file: &Path, mode: Mode) -> Result<Secret, ConfigError> {
    if !secrets_file.exists() {
        return Err(ConfigError::SecretsNotFound {
            path: secrets_file.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(secrets_file).map_err(|source| ConfigError::ReadSecrets {
        path: secrets_file.to_path_buf(),
        source,
    })?;
    let mut raw: RawSecrets =
        toml::from_str(&content).map_err(|source| ConfigError::ParseSecrets {
            path: secrets_file.to_path_buf(),
            source,
        })?;

    let section = mode.section();
    let entry = raw
        .store
        .remove(mode.as_str())
        .ok_or_else(|| ConfigError::MissingSecretsModeSection {
            section: section.clone(),
            path: secrets_file.to_path_buf(),
        })?;

    entry
        .password
        .map(Secret::new)
        .ok_or_else(|| ConfigError::MissingPassword {
            section,
            path: secrets_file.to_path_buf(),
        })
}

/// Table prefixes no collection may use: SQLite's own tables and the
/// ingester's collection registry.
const RESERVED_PREFIXES: &[&str] = &["sqlite_", "_mdi_"];

fn is_identifier(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if RESERVED_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const GOOD_SECTION: &str = r#"
[store.dev]
address = "./data"
port = 27017
username = "curator"
auth_source = "admin"
database = "metadata"
collection = "documents"
index_keys = ["archived_path"]
"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn mode_parses_and_rejects_unknown() {
        assert_eq!("prod".parse::<Mode>().unwrap(), Mode::Prod);
        let err = "staging".parse::<Mode>().unwrap_err();
        assert!(err.to_string().contains("\"staging\""));
        assert_eq!(Mode::Test.section(), "store.test");
    }

    #[test]
    fn good_config_resolves_secrets_relative_to_config_dir() {
        let tmp = TempDir::new().unwrap();
        let cfg = write(
            &tmp,
            "ingester.toml",
            &format!("{GOOD_SECTION}\n[secrets]\nfilename = \"secrets.toml\"\n"),
        );

        let config = load_config(&cfg, Mode::Dev).unwrap();
        assert_eq!(config.store.backend, Backend::Sqlite);
        assert_eq!(config.store.index_keys, vec!["archived_path"]);
        assert_eq!(config.store.timeout_secs, 30);
        assert_eq!(config.secrets_file, tmp.path().join("secrets.toml"));
    }

    #[test]
    fn single_index_key_string_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let section = GOOD_SECTION.replace(r#"["archived_path"]"#, r#""archived_path""#);
        let cfg = write(
            &tmp,
            "ingester.toml",
            &format!("{section}\n[secrets]\nfilename = \"s.toml\"\n"),
        );

        let config = load_config(&cfg, Mode::Dev).unwrap();
        assert_eq!(config.store.index_keys, vec!["archived_path"]);
    }

    #[test]
    fn bad_format_is_a_parse_error() {
        let tmp = TempDir::new().unwrap();
        let cfg = write(&tmp, "bad.toml", "[store.dev\naddress = ");
        let err = load_config(&cfg, Mode::Dev).unwrap_err();
        assert!(err.to_string().starts_with("cannot parse config file"));
    }

    #[test]
    fn unreadable_config_is_a_read_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&tmp.path().join("absent.toml"), Mode::Dev).unwrap_err();
        assert!(err.to_string().starts_with("cannot read config file"));
    }

    #[test]
    fn missing_mode_section() {
        let tmp = TempDir::new().unwrap();
        let cfg = write(&tmp, "c.toml", GOOD_SECTION);
        let err = load_config(&cfg, Mode::Prod).unwrap_err();
        assert!(err.to_string().starts_with("no [store.prod] section in config file"));
    }

    #[test]
    fn missing_index_keys() {
        let tmp = TempDir::new().unwrap();
        let section = GOOD_SECTION.replace("index_keys = [\"archived_path\"]", "");
        let cfg = write(&tmp, "c.toml", &section);
        let err = load_config(&cfg, Mode::Dev).unwrap_err();
        assert!(err.to_string().starts_with("no index_keys in [store.dev] section"));

        let section = GOOD_SECTION.replace("[\"archived_path\"]", "[]");
        let cfg = write(&tmp, "c.toml", &section);
        let err = load_config(&cfg, Mode::Dev).unwrap_err();
        assert!(matches!(err, ConfigError::MissingIndexKeys { .. }));
    }

    #[test]
    fn missing_required_field_is_named() {
        let tmp = TempDir::new().unwrap();
        let section = GOOD_SECTION.replace("collection = \"documents\"", "");
        let cfg = write(
            &tmp,
            "c.toml",
            &format!("{section}\n[secrets]\nfilename = \"s.toml\"\n"),
        );
        let err = load_config(&cfg, Mode::Dev).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "collection", .. }));
    }

    #[test]
    fn collection_must_be_an_identifier() {
        let tmp = TempDir::new().unwrap();
        let section = GOOD_SECTION.replace("\"documents\"", "\"docs; DROP TABLE x\"");
        let cfg = write(
            &tmp,
            "c.toml",
            &format!("{section}\n[secrets]\nfilename = \"s.toml\"\n"),
        );
        let err = load_config(&cfg, Mode::Dev).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCollection { .. }));
    }

    #[test]
    fn reserved_collection_names_are_rejected() {
        let tmp = TempDir::new().unwrap();
        for name in ["sqlite_master", "SQLITE_stat1", "_mdi_collections"] {
            let section = GOOD_SECTION.replace("\"documents\"", &format!("\"{name}\""));
            let cfg = write(
                &tmp,
                "c.toml",
                &format!("{section}\n[secrets]\nfilename = \"s.toml\"\n"),
            );
            let err = load_config(&cfg, Mode::Dev).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidCollection { name: n } if n == name),
                "{name} accepted"
            );
        }

        let section = GOOD_SECTION.replace("\"documents\"", "\"collections\"");
        let cfg = write(
            &tmp,
            "c.toml",
            &format!("{section}\n[secrets]\nfilename = \"s.toml\"\n"),
        );
        let config = load_config(&cfg, Mode::Dev).unwrap();
        assert_eq!(config.store.collection, "collections");
    }

    #[test]
    fn explicit_secrets_path_replaces_secrets_section() {
        let tmp = TempDir::new().unwrap();
        let elsewhere = tmp.path().join("vault").join("secrets.toml");

        let cfg = write(&tmp, "c.toml", GOOD_SECTION);
        let config = load_config_with_secrets(&cfg, Mode::Dev, Some(&elsewhere)).unwrap();
        assert_eq!(config.secrets_file, elsewhere);

        let cfg = write(
            &tmp,
            "c.toml",
            &format!("{GOOD_SECTION}\n[secrets]\nfilename = \"s.toml\"\n"),
        );
        let config = load_config_with_secrets(&cfg, Mode::Dev, Some(&elsewhere)).unwrap();
        assert_eq!(config.secrets_file, elsewhere);
    }

    #[test]
    fn missing_secrets_section_and_filename() {
        let tmp = TempDir::new().unwrap();
        let cfg = write(&tmp, "c.toml", GOOD_SECTION);
        let err = load_config(&cfg, Mode::Dev).unwrap_err();
        assert!(err.to_string().starts_with("no [secrets] section"));

        let cfg = write(&tmp, "c.toml", &format!("{GOOD_SECTION}\n[secrets]\n"));
        let err = load_config(&cfg, Mode::Dev).unwrap_err();
        assert!(err.to_string().starts_with("no filename key in [secrets] section"));
    }

    #[test]
    fn password_lookup_failures_are_distinct() {
        let tmp = TempDir::new().unwrap();

        let err = read_password(&tmp.path().join("absent.toml"), Mode::Dev).unwrap_err();
        assert!(matches!(err, ConfigError::SecretsNotFound { .. }));

        let secrets = write(&tmp, "s.toml", "[store.prod]\npassword = \"p\"\n");
        let err = read_password(&secrets, Mode::Dev).unwrap_err();
        assert!(err.to_string().starts_with("no [store.dev] section in secrets file"));

        let secrets = write(&tmp, "s.toml", "[store.dev]\nuser = \"u\"\n");
        let err = read_password(&secrets, Mode::Dev).unwrap_err();
        assert!(err.to_string().starts_with("no password in [store.dev] section"));

        let secrets = write(&tmp, "s.toml", "[store.dev]\npassword = \"hunter2\"\n");
        let password = read_password(&secrets, Mode::Dev).unwrap();
        assert_eq!(password.expose(), "hunter2");
        assert_eq!(format!("{password:?}"), "Secret(***)");
    }
}
