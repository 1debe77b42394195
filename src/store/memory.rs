//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Documents live in a `HashMap` keyed by their canonical dedup key behind a
//! single `RwLock`; the check and the insert happen under one write guard.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{ConnectorError, InsertError};
use crate::models::Document;

use super::{DedupKey, Store};

/// In-memory store with the same uniqueness semantics as the SQLite backend.
pub struct InMemoryStore {
    collection: String,
    index_keys: Vec<String>,
    docs: RwLock<HashMap<String, Document>>,
}

impl InMemoryStore {
    pub fn new(collection: impl Into<String>, index_keys: Vec<String>) -> Self {
        Self {
            collection: collection.into(),
            index_keys,
            docs: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the stored documents, in no particular order.
    pub fn documents(&self) -> Vec<Document> {
        self.docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn index_keys(&self) -> &[String] {
        &self.index_keys
    }

    async fn insert(&self, doc: &Document) -> Result<(), InsertError> {
        let key = DedupKey::extract(doc, &self.index_keys);
        let mut docs = self.docs.write().map_err(|_| ConnectorError::Insert {
            collection: self.collection.clone(),
            message: "in-memory store lock poisoned".to_string(),
        })?;

        match docs.entry(key.canonical()) {
            Entry::Occupied(_) => Err(InsertError::Duplicate {
                key: key.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(doc.clone());
                Ok(())
            }
        }
    }
}
