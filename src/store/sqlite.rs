//! SQLite-backed [`Store`] implementation.
//!
//! Inserts are a single `INSERT` against a table whose `dedup_hash` column
//! carries a `UNIQUE` index. A duplicate is recognized from the database's
//! unique-violation error, so two racing inserts are decided by SQLite, not by
//! a read-then-write in this process.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::connector::ConnectionDescriptor;
use crate::db;
use crate::error::{ConnectorError, InsertError};
use crate::migrate;
use crate::models::Document;

use super::{DedupKey, Store};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    index_keys: Vec<String>,
}

impl SqliteStore {
    /// Wraps an existing pool. The caller is responsible for having run
    /// [`migrate::ensure_collection`].
    pub fn new(pool: SqlitePool, collection: impl Into<String>, index_keys: Vec<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
            index_keys,
        }
    }

    /// Opens the descriptor's database and installs the uniqueness index.
    pub async fn open(descriptor: &ConnectionDescriptor) -> Result<Self, ConnectorError> {
        let pool = db::connect(descriptor).await?;
        migrate::ensure_collection(&pool, &descriptor.collection, &descriptor.index_keys).await?;
        Ok(Self::new(
            pool,
            descriptor.collection.clone(),
            descriptor.index_keys.clone(),
        ))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored documents.
    pub async fn count(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{}""#, self.collection))
            .fetch_one(&self.pool)
            .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn insert_error(&self, message: String) -> ConnectorError {
        ConnectorError::Insert {
            collection: self.collection.clone(),
            message,
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn index_keys(&self) -> &[String] {
        &self.index_keys
    }

    async fn insert(&self, doc: &Document) -> Result<(), InsertError> {
        let key = DedupKey::extract(doc, &self.index_keys);
        let body = serde_json::to_string(doc).map_err(|e| self.insert_error(e.to_string()))?;
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(&format!(
            r#"INSERT INTO "{}" (id, dedup_hash, dedup_key, body, ingested_at) VALUES (?, ?, ?, ?, ?)"#,
            self.collection
        ))
        .bind(&id)
        .bind(key.hash())
        .bind(key.canonical())
        .bind(&body)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(collection = %self.collection, %id, "document inserted");
                Ok(())
            }
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(InsertError::Duplicate {
                    key: key.to_string(),
                })
            }
            Err(e) => Err(self.insert_error(e.to_string()).into()),
        }
    }
}
