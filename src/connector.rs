//! Store connector: configuration in, live store handle out.
//!
//! [`resolve`] reads the config file and the secrets file it references and
//! produces a [`ConnectionDescriptor`]. [`open`] turns a descriptor into an
//! `Arc<dyn Store>` with the uniqueness index already installed, so the
//! pipeline can start inserting immediately.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{self, Backend, Mode, Secret};
use crate::error::ConnectorError;
use crate::store::{InMemoryStore, SqliteStore, Store};

/// Everything needed to reach one collection.
///
/// For the SQLite backend `address` is the directory holding database files
/// and `database` the file stem; the network and credential fields are
/// carried for parity with server-backed stores.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub backend: Backend,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub auth_source: String,
    pub password: Secret,
    pub database: String,
    pub collection: String,
    pub index_keys: Vec<String>,
    pub timeout: Duration,
}

impl ConnectionDescriptor {
    /// `<address>/<database>.sqlite`.
    pub fn database_path(&self) -> PathBuf {
        Path::new(&self.address).join(format!("{}.sqlite", self.database))
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}:{}/{}?authSource={} collection={} index_keys=[{}]",
            self.backend,
            self.username,
            self.address,
            self.port,
            self.database,
            self.auth_source,
            self.collection,
            self.index_keys.join(", ")
        )
    }
}

/// Resolves config and secrets for `mode`.
///
/// With no `config_path`, `$HOME/ingester_config.toml` is used. A
/// `secrets_path` overrides the `[secrets]` section of the config file.
pub fn resolve(
    mode: Mode,
    config_path: Option<&Path>,
    secrets_path: Option<&Path>,
) -> Result<ConnectionDescriptor, ConnectorError> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config::default_config_path()?,
    };

    let cfg = config::load_config_with_secrets(&path, mode, secrets_path)?;
    let password = config::read_password(&cfg.secrets_file, mode)?;
    let store = cfg.store;

    Ok(ConnectionDescriptor {
        backend: store.backend,
        address: store.address,
        port: store.port,
        username: store.username,
        auth_source: store.auth_source,
        password,
        database: store.database,
        collection: store.collection,
        index_keys: store.index_keys,
        timeout: Duration::from_secs(store.timeout_secs),
    })
}

/// Opens the store a descriptor points at.
pub async fn open(descriptor: &ConnectionDescriptor) -> Result<Arc<dyn Store>, ConnectorError> {
    let store: Arc<dyn Store> = match descriptor.backend {
        Backend::Sqlite => Arc::new(SqliteStore::open(descriptor).await?),
        Backend::Memory => Arc::new(InMemoryStore::new(
            descriptor.collection.clone(),
            descriptor.index_keys.clone(),
        )),
    };
    info!(store = %descriptor, "connected");
    Ok(store)
}

/// [`resolve`] followed by [`open`].
pub async fn connect(
    mode: Mode,
    config_path: Option<&Path>,
    secrets_path: Option<&Path>,
) -> Result<Arc<dyn Store>, ConnectorError> {
    let descriptor = resolve(mode, config_path, secrets_path)?;
    open(&descriptor).await
}
