//! Storage abstraction for the ingester.
//!
//! The [`Store`] trait is the only contract the pipeline has with the
//! document store: insert a document unless another one already holds the
//! same uniqueness key. Implementations enforce that atomically; the pipeline
//! never checks for existing documents itself.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteStore`] | Durable store with a `UNIQUE` dedup index |
//! | [`InMemoryStore`] | Tests and dry runs |

pub mod memory;
pub mod sqlite;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::InsertError;
use crate::models::Document;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A document store with insert-if-absent semantics.
///
/// Implementations must be `Send + Sync`; one handle is shared by every
/// concurrent ingestion in a session.
#[async_trait]
pub trait Store: Send + Sync {
    /// Name of the collection documents are written to.
    fn collection(&self) -> &str;

    /// Fields whose combined values must be unique across the collection.
    fn index_keys(&self) -> &[String];

    /// Inserts `doc` unless its uniqueness key is already present.
    ///
    /// Two concurrent inserts with the same key resolve to one `Ok(())` and
    /// one [`InsertError::Duplicate`].
    async fn insert(&self, doc: &Document) -> Result<(), InsertError>;
}

/// The values a document holds for a store's index keys.
///
/// Index keys may be dotted paths into nested objects (`run.id`). A missing
/// field contributes `null`, so two documents that both lack a key field
/// collide with each other. Integral floats compare equal to integers: `1.0`
/// and `1` are the same key.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupKey {
    fields: Vec<(String, Value)>,
}

impl DedupKey {
    pub fn extract(doc: &Document, index_keys: &[String]) -> Self {
        let fields = index_keys
            .iter()
            .map(|key| {
                let value = lookup(doc, key).map(numeric_key).unwrap_or(Value::Null);
                (key.clone(), value)
            })
            .collect();
        Self { fields }
    }

    /// Stable serialization of the key values, in index-key order.
    pub fn canonical(&self) -> String {
        let values: Vec<&Value> = self.fields.iter().map(|(_, v)| v).collect();
        serde_json::to_string(&values).unwrap_or_default()
    }

    /// SHA-256 of [`canonical`](Self::canonical), hex encoded.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Rewrites integral floats to integers, recursively.
fn numeric_key(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(numeric_key).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), numeric_key(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
