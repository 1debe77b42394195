//! Collection tables and their uniqueness index.
//!
//! Each collection is one table. Documents are stored as JSON text next to
//! the SHA-256 of their dedup key; a `UNIQUE` index on that hash is what makes
//! inserts idempotent. The `_mdi_collections` table records the index keys a
//! collection was created with, so a later connection with different keys is
//! refused instead of silently mixing two key definitions in one index.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::ConnectorError;

/// Creates the collection table and its unique index if they don't exist.
///
/// Idempotent; safe to call on every connection.
pub async fn ensure_collection(
    pool: &SqlitePool,
    collection: &str,
    index_keys: &[String],
) -> Result<(), ConnectorError> {
    let index_error = |message: String| ConnectorError::Index {
        collection: collection.to_string(),
        message,
    };
    let keys_json = serde_json::to_string(index_keys).map_err(|e| index_error(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _mdi_collections (
            name TEXT PRIMARY KEY,
            index_keys TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| index_error(e.to_string()))?;

    sqlx::query(
        "INSERT INTO _mdi_collections (name, index_keys, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
    )
    .bind(collection)
    .bind(&keys_json)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await
    .map_err(|e| index_error(e.to_string()))?;

    let recorded: String = sqlx::query_scalar("SELECT index_keys FROM _mdi_collections WHERE name = ?")
        .bind(collection)
        .fetch_one(pool)
        .await
        .map_err(|e| index_error(e.to_string()))?;
    if recorded != keys_json {
        return Err(index_error(format!(
            "collection is indexed on {}, config asks for {}",
            recorded, keys_json
        )));
    }

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{collection}" (
            id TEXT PRIMARY KEY,
            dedup_hash TEXT NOT NULL,
            dedup_key TEXT NOT NULL,
            body TEXT NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await
    .map_err(|e| index_error(e.to_string()))?;

    sqlx::query(&format!(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS "idx_{collection}_dedup" ON "{collection}"(dedup_hash)"#
    ))
    .execute(pool)
    .await
    .map_err(|e| index_error(e.to_string()))?;

    info!(collection, index_keys = %keys_json, "uniqueness index ready");
    Ok(())
}
