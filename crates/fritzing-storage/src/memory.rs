//! In-memory document collection.
//!
//! Documents are kept in insertion order, which is the natural order
//! `find_many` returns when no sort is requested.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::filter::{compare_plain, compare_values, lookup, Filter, FindOptions};
use crate::persistence::WalEntry;
use crate::{document_id, Document, DocumentStore, StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    pub(crate) fn contains_id(&self, id: &str) -> bool {
        self.docs
            .read()
            .iter()
            .any(|d| document_id(d) == Some(id))
    }

    pub(crate) fn snapshot(&self) -> Vec<Document> {
        self.docs.read().clone()
    }

    pub(crate) fn find_one_now(&self, filter: &Filter) -> Option<Document> {
        self.docs.read().iter().find(|d| filter.matches(d)).cloned()
    }

    pub(crate) fn find_many_now(&self, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let docs = self.docs.read();
        let mut hits: Vec<&Document> = docs.iter().filter(|d| filter.matches(d)).collect();
        if let Some(sort) = &options.sort {
            // Stable sort: ties keep insertion order.
            hits.sort_by(|a, b| {
                let ord = compare_values(lookup(a, &sort.field), lookup(b, &sort.field));
                if sort.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        let limit = options.limit.unwrap_or(usize::MAX);
        hits.into_iter()
            .skip(options.skip)
            .take(limit)
            .cloned()
            .collect()
    }

    pub(crate) fn count_now(&self, filter: &Filter) -> u64 {
        self.docs.read().iter().filter(|d| filter.matches(d)).count() as u64
    }

    pub(crate) fn distinct_now(&self, field_path: &str) -> Vec<Value> {
        let docs = self.docs.read();
        let mut values: Vec<Value> = docs
            .iter()
            .filter_map(|d| lookup(d, field_path))
            .filter(|v| !v.is_null())
            .cloned()
            .collect();
        values.sort_by(|a, b| compare_plain(Some(a), Some(b)));
        values.dedup();
        values
    }

    /// Check that `entry` can be applied without side effects.
    ///
    /// Returns the number of documents it would touch.
    pub(crate) fn check(&self, entry: &WalEntry) -> StoreResult<u64> {
        match entry {
            WalEntry::Insert { document } => {
                let id = document_id(document).ok_or_else(|| {
                    StoreError::InvalidDocument("document has no string `id` field".to_string())
                })?;
                if self.contains_id(id) {
                    return Err(StoreError::DuplicateId(id.to_string()));
                }
                Ok(1)
            }
            WalEntry::Replace { id, .. }
            | WalEntry::UpdateFields { id, .. }
            | WalEntry::Delete { id } => Ok(u64::from(self.contains_id(id))),
        }
    }

    /// Apply a mutation. Replay and live writes share this path.
    pub(crate) fn apply(&self, entry: WalEntry) -> StoreResult<u64> {
        let mut docs = self.docs.write();
        match entry {
            WalEntry::Insert { document } => {
                let id = document_id(&document).ok_or_else(|| {
                    StoreError::InvalidDocument("document has no string `id` field".to_string())
                })?;
                if docs.iter().any(|d| document_id(d) == Some(id)) {
                    return Err(StoreError::DuplicateId(id.to_string()));
                }
                docs.push(document);
                Ok(1)
            }
            WalEntry::Replace { id, mut document } => {
                let Some(slot) = docs.iter_mut().find(|d| document_id(d) == Some(id.as_str())) else {
                    return Ok(0);
                };
                document.insert("id".to_string(), Value::String(id));
                *slot = document;
                Ok(1)
            }
            WalEntry::UpdateFields { id, fields } => {
                let Some(slot) = docs.iter_mut().find(|d| document_id(d) == Some(id.as_str())) else {
                    return Ok(0);
                };
                for (key, value) in fields {
                    if key != "id" {
                        slot.insert(key, value);
                    }
                }
                Ok(1)
            }
            WalEntry::Delete { id } => {
                let before = docs.len();
                docs.retain(|d| document_id(d) != Some(id.as_str()));
                Ok((before - docs.len()) as u64)
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        Ok(self.find_one_now(filter))
    }

    async fn find_many(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        Ok(self.find_many_now(filter, options))
    }

    async fn insert(&self, document: Document) -> StoreResult<()> {
        self.apply(WalEntry::Insert { document }).map(|_| ())
    }

    async fn replace(&self, id: &str, document: Document) -> StoreResult<u64> {
        self.apply(WalEntry::Replace {
            id: id.to_string(),
            document,
        })
    }

    async fn update_fields(&self, id: &str, fields: Document) -> StoreResult<u64> {
        self.apply(WalEntry::UpdateFields {
            id: id.to_string(),
            fields,
        })
    }

    async fn delete(&self, id: &str) -> StoreResult<u64> {
        self.apply(WalEntry::Delete { id: id.to_string() })
    }

    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        Ok(self.count_now(filter))
    }

    async fn aggregate_distinct(&self, field_path: &str) -> StoreResult<Vec<Value>> {
        Ok(self.distinct_now(field_path))
    }
}
