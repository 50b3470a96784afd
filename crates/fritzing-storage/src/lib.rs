//! Fritzing Editor Document Store
//!
//! A small document store with the access surface the catalog and project
//! services need:
//!
//! ```text
//!   services ──► Collection<T> ──► dyn DocumentStore
//!                  (serde)            ├── MemoryStore     (RwLock<Vec<Document>>)
//!                                     └── JournaledStore  (MemoryStore + JSON-lines WAL)
//! ```
//!
//! ## Key Features
//!
//! - **Filters**: equality, case-insensitive substring, `and`/`or`, dotted paths
//! - **Paging**: `skip`/`limit` with an optional sort key
//! - **Distinct**: sorted distinct values of one field path
//! - **Durable**: journaled collections replay their WAL on open
//!
//! A `Database` is an explicit handle created by the process entry point and
//! passed to whoever needs a collection. Atomicity is per document; there are
//! no multi-document transactions.

pub mod filter;
pub mod memory;
pub mod persistence;


use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use filter::{Filter, FindOptions, Sort};
pub use memory::MemoryStore;
pub use persistence::{JournaledStore, WalEntry, WriteAheadLog};

// ============================================================================
// Core Types
// ============================================================================

/// A stored document: a JSON object with a string `id` field.
pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document with id `{0}` already exists")]
    DuplicateId(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("store is closed")]
    Closed,
    #[error("store task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn document_id(doc: &Document) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

/// Serialize a record (or partial record) into a document.
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

// ============================================================================
// Store Interface
// ============================================================================

/// Persistence operations over one collection of documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>>;

    async fn find_many(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>>;

    /// Fails with `DuplicateId` if a document with the same `id` exists.
    async fn insert(&self, document: Document) -> StoreResult<()>;

    /// Replace the whole document stored under `id`; returns the matched count.
    async fn replace(&self, id: &str, document: Document) -> StoreResult<u64>;

    /// Overwrite the given top-level fields; returns the modified count.
    async fn update_fields(&self, id: &str, fields: Document) -> StoreResult<u64>;

    async fn delete(&self, id: &str) -> StoreResult<u64>;

    async fn count(&self, filter: &Filter) -> StoreResult<u64>;

    /// Distinct non-null values at `field_path`, ascending.
    async fn aggregate_distinct(&self, field_path: &str) -> StoreResult<Vec<Value>>;
}

// ============================================================================
// Typed Collections
// ============================================================================

/// Typed view over a `DocumentStore`.
pub struct Collection<T> {
    name: String,
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            store: self.store.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(name: impl Into<String>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            name: name.into(),
            store,
            _record: PhantomData,
        }
    }

    /// Collection backed by a fresh `MemoryStore`.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(MemoryStore::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn decode(doc: Document) -> StoreResult<T> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }

    pub async fn find_one(&self, filter: &Filter) -> StoreResult<Option<T>> {
        self.store.find_one(filter).await?.map(Self::decode).transpose()
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<T>> {
        self.find_one(&Filter::eq("id", id)).await
    }

    pub async fn find_many(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<T>> {
        self.store
            .find_many(filter, options)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    pub async fn insert(&self, record: &T) -> StoreResult<()> {
        self.store.insert(to_document(record)?).await
    }

    pub async fn replace(&self, id: &str, record: &T) -> StoreResult<u64> {
        self.store.replace(id, to_document(record)?).await
    }

    pub async fn update_fields(&self, id: &str, fields: Document) -> StoreResult<u64> {
        self.store.update_fields(id, fields).await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<u64> {
        self.store.delete(id).await
    }

    pub async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        self.store.count(filter).await
    }

    pub async fn distinct(&self, field_path: &str) -> StoreResult<Vec<Value>> {
        self.store.aggregate_distinct(field_path).await
    }
}

// ============================================================================
// Database Handle
// ============================================================================

/// Where collections live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for journaled collections; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Database name; journals go to `<data_dir>/<db_name>/<collection>.wal`.
    pub db_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            db_name: "fritzing_editor".to_string(),
        }
    }
}

enum OpenCollection {
    Memory(Arc<MemoryStore>),
    Journaled(Arc<JournaledStore>),
}

impl OpenCollection {
    fn as_store(&self) -> Arc<dyn DocumentStore> {
        match self {
            OpenCollection::Memory(s) => s.clone(),
            OpenCollection::Journaled(s) => s.clone(),
        }
    }
}

/// Explicit database handle: opens named collections and closes them.
pub struct Database {
    config: StoreConfig,
    collections: Mutex<HashMap<String, OpenCollection>>,
}

impl Database {
    /// Open the database described by `config`, creating its directory.
    pub fn connect(config: &StoreConfig) -> StoreResult<Self> {
        if let Some(dir) = &config.data_dir {
            std::fs::create_dir_all(dir.join(&config.db_name))?;
        }
        tracing::info!(
            db = %config.db_name,
            data_dir = ?config.data_dir,
            "connected to document store"
        );
        Ok(Self {
            config: config.clone(),
            collections: Mutex::new(HashMap::new()),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            config: StoreConfig::default(),
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.db_name
    }

    /// Typed handle to `name`, opening (and replaying) it on first use.
    pub fn collection<T>(&self, name: &str) -> StoreResult<Collection<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let mut open = self.collections.lock();
        if let Some(existing) = open.get(name) {
            return Ok(Collection::new(name, existing.as_store()));
        }

        let opened = match &self.config.data_dir {
            Some(dir) => {
                let path = dir.join(&self.config.db_name).join(format!("{name}.wal"));
                OpenCollection::Journaled(Arc::new(JournaledStore::open(&path)?))
            }
            None => OpenCollection::Memory(Arc::new(MemoryStore::new())),
        };
        let store = opened.as_store();
        open.insert(name.to_string(), opened);
        Ok(Collection::new(name, store))
    }

    /// Checkpoint every journaled collection and reject further writes.
    pub fn close(&self) -> StoreResult<()> {
        let open = self.collections.lock();
        for (name, collection) in open.iter() {
            if let OpenCollection::Journaled(store) = collection {
                store.close()?;
                tracing::debug!(collection = %name, "closed collection journal");
            }
        }
        tracing::info!(db = %self.config.db_name, "disconnected from document store");
        Ok(())
    }
}
