//! Journaled persistence
//!
//! A journaled collection is an in-memory collection whose every mutation is
//! first appended to a write-ahead log:
//! 1. one JSON object per line, fsync'd before the mutation is applied
//! 2. replayed in order on open
//! 3. compacted by `checkpoint` into one insert per live document
//!
//! A torn final line (crash mid-append) is dropped on replay; a corrupt line
//! anywhere else is an error.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::{Filter, FindOptions};
use crate::memory::MemoryStore;
use crate::{Document, DocumentStore, StoreError, StoreResult};

// ============================================================================
// Write-Ahead Log
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalEntry {
    Insert { document: Document },
    Replace { id: String, document: Document },
    UpdateFields { id: String, fields: Document },
    Delete { id: String },
}

/// Append-only JSON-lines log for one collection.
pub struct WriteAheadLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl WriteAheadLog {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append entry to WAL
    pub fn append(&self, entry: &WalEntry) -> StoreResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    /// Replay WAL for recovery
    pub fn replay<F: FnMut(WalEntry) -> StoreResult<()>>(&self, mut handler: F) -> StoreResult<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;

        let lines = BufReader::new(&*file)
            .lines()
            .collect::<std::io::Result<Vec<String>>>()?;
        let last = lines.len().saturating_sub(1);

        let mut replayed = 0usize;
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalEntry>(line) {
                Ok(entry) => {
                    handler(entry)?;
                    replayed += 1;
                }
                Err(err) if idx == last => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %err,
                        "dropping torn trailing WAL entry"
                    );
                }
                Err(err) => return Err(StoreError::Serialization(err)),
            }
        }
        Ok(replayed)
    }

    /// Replace the log with one insert per document.
    pub fn rewrite(&self, documents: &[Document]) -> StoreResult<()> {
        let tmp = self.path.with_extension("wal.tmp");
        {
            let mut out = File::create(&tmp)?;
            for document in documents {
                let entry = WalEntry::Insert {
                    document: document.clone(),
                };
                let mut line = serde_json::to_vec(&entry)?;
                line.push(b'\n');
                out.write_all(&line)?;
            }
            out.sync_all()?;
        }

        let mut file = self.file.lock();
        std::fs::rename(&tmp, &self.path)?;
        *file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        Ok(())
    }
}

// ============================================================================
// Journaled Store
// ============================================================================

/// `MemoryStore` backed by a `WriteAheadLog`.
///
/// Reads are served from memory on the caller's task. Writes fsync, so the
/// async methods run them on tokio's blocking pool.
pub struct JournaledStore {
    journal: Arc<Journal>,
}

struct Journal {
    memory: MemoryStore,
    wal: WriteAheadLog,
    // Serializes check -> append -> apply so the log order matches memory.
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Journal {
    fn checkpoint(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        self.wal.rewrite(&self.memory.snapshot())
    }

    fn write(&self, entry: WalEntry) -> StoreResult<u64> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        let _guard = self.write_lock.lock();
        if self.memory.check(&entry)? == 0 {
            return Ok(0);
        }
        self.wal.append(&entry)?;
        self.memory.apply(entry)
    }
}

impl JournaledStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let wal = WriteAheadLog::open(path)?;
        let memory = MemoryStore::new();

        let replayed = wal.replay(|entry| memory.apply(entry).map(|_| ()))?;
        tracing::debug!(
            path = %path.display(),
            entries = replayed,
            documents = memory.len(),
            "replayed collection journal"
        );

        Ok(Self {
            journal: Arc::new(Journal {
                memory,
                wal,
                write_lock: Mutex::new(()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        self.journal.wal.path()
    }

    /// Compact the journal to the current document set.
    pub fn checkpoint(&self) -> StoreResult<()> {
        self.journal.checkpoint()
    }

    /// Checkpoint and refuse further writes.
    pub fn close(&self) -> StoreResult<()> {
        self.journal.checkpoint()?;
        self.journal.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, entry: WalEntry) -> StoreResult<u64> {
        let journal = Arc::clone(&self.journal);
        tokio::task::spawn_blocking(move || journal.write(entry))
            .await
            .map_err(|e| StoreError::Task(format!("journal write task join failed: {e}")))?
    }

    fn memory(&self) -> &MemoryStore {
        &self.journal.memory
    }
}

#[async_trait]
impl DocumentStore for JournaledStore {
    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        Ok(self.memory().find_one_now(filter))
    }

    async fn find_many(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        Ok(self.memory().find_many_now(filter, options))
    }

    async fn insert(&self, document: Document) -> StoreResult<()> {
        self.write(WalEntry::Insert { document }).await.map(|_| ())
    }

    async fn replace(&self, id: &str, document: Document) -> StoreResult<u64> {
        self.write(WalEntry::Replace {
            id: id.to_string(),
            document,
        })
        .await
    }

    async fn update_fields(&self, id: &str, fields: Document) -> StoreResult<u64> {
        self.write(WalEntry::UpdateFields {
            id: id.to_string(),
            fields,
        })
        .await
    }

    async fn delete(&self, id: &str) -> StoreResult<u64> {
        self.write(WalEntry::Delete { id: id.to_string() }).await
    }

    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        Ok(self.memory().count_now(filter))
    }

    async fn aggregate_distinct(&self, field_path: &str) -> StoreResult<Vec<Value>> {
        Ok(self.memory().distinct_now(field_path))
    }
}
