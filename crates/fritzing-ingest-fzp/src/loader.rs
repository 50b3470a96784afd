//! Catalog loader: directory of descriptors → catalog collection.
//!
//! Merge policy per parsed descriptor, keyed on `module_id`:
//!
//! | catalog has match | `force_reload` | action                         |
//! |-------------------|----------------|--------------------------------|
//! | no                | any            | insert with a fresh id         |
//! | yes               | false          | skip                           |
//! | yes               | true           | replace in place (same id)     |
//!
//! Files are processed one at a time; the lookup and the write for a file
//! happen before the next file is read. Directory listing and file reads run
//! on tokio's blocking pool.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use fritzing_model::{PartCreate, PartRecord};
use fritzing_storage::{Collection, Filter, StoreResult};
use serde::Serialize;

use crate::descriptor::parse_descriptor_file;
use crate::DescriptorError;

/// File extension of descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = "fzp";

const PROGRESS_EVERY: u64 = 100;

/// Outcome of one `load` call. `parts_loaded` is the contract value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Records written (inserted + replaced), or the existing catalog size
    /// when the load short-circuited.
    pub parts_loaded: u64,
    pub inserted: u64,
    pub replaced: u64,
    pub skipped: u64,
    pub unparseable: u64,
    pub failed: u64,
    pub short_circuited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeOutcome {
    Inserted,
    Replaced,
    Skipped,
}

/// Descriptor files directly inside `dir`, in directory-listing order.
///
/// Entries that cannot be read are logged and skipped.
pub fn descriptor_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)?.map(|entry| entry.map(|e| e.path()));
    Ok(keep_descriptors(dir, entries))
}

fn keep_descriptors<I>(dir: &Path, entries: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %err,
                    "skipping unreadable directory entry"
                );
                continue;
            }
        };
        if !path.extension().map_or(false, |e| e == DESCRIPTOR_EXTENSION) {
            continue;
        }
        if path.is_file() {
            files.push(path);
        }
    }
    files
}

/// `None` when `dir` does not exist.
fn scan(dir: &Path) -> io::Result<Option<Vec<PathBuf>>> {
    if !dir.exists() {
        return Ok(None);
    }
    descriptor_files(dir).map(Some)
}

async fn read_descriptor(path: PathBuf) -> Result<PartCreate, DescriptorError> {
    tokio::task::spawn_blocking(move || parse_descriptor_file(&path))
        .await
        .unwrap_or_else(|e| {
            Err(DescriptorError::Io(io::Error::new(
                ErrorKind::Other,
                format!("descriptor read task join failed: {e}"),
            )))
        })
}

pub struct CatalogLoader {
    parts: Collection<PartRecord>,
}

impl CatalogLoader {
    pub fn new(parts: Collection<PartRecord>) -> Self {
        Self { parts }
    }

    /// Ingest every descriptor in `dir`.
    ///
    /// Only the initial catalog count can fail the call; per-file parse and
    /// store failures are logged and counted.
    pub async fn load(&self, dir: &Path, force_reload: bool) -> StoreResult<LoadSummary> {
        let mut summary = LoadSummary::default();

        if !force_reload {
            let existing = self.parts.count(&Filter::All).await?;
            if existing > 0 {
                tracing::info!(existing, "catalog already populated; skipping descriptor load");
                summary.parts_loaded = existing;
                summary.short_circuited = true;
                return Ok(summary);
            }
        }

        let owned = dir.to_path_buf();
        let files = match tokio::task::spawn_blocking(move || scan(&owned)).await {
            Ok(Ok(Some(files))) => files,
            Ok(Ok(None)) => {
                tracing::info!(dir = %dir.display(), "descriptor directory does not exist");
                return Ok(summary);
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %err,
                    "failed to list descriptor directory"
                );
                return Ok(summary);
            }
            Err(err) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %err,
                    "descriptor listing task join failed"
                );
                return Ok(summary);
            }
        };

        for path in files {
            let data = match read_descriptor(path.clone()).await {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "skipping unparseable descriptor"
                    );
                    summary.unparseable += 1;
                    continue;
                }
            };

            match self.merge(data, force_reload).await {
                Ok(MergeOutcome::Inserted) => summary.inserted += 1,
                Ok(MergeOutcome::Replaced) => summary.replaced += 1,
                Ok(MergeOutcome::Skipped) => {
                    summary.skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to store descriptor"
                    );
                    summary.failed += 1;
                    continue;
                }
            }

            summary.parts_loaded += 1;
            if summary.parts_loaded % PROGRESS_EVERY == 0 {
                tracing::info!(parts_loaded = summary.parts_loaded, "loading parts");
            }
        }

        tracing::info!(
            dir = %dir.display(),
            parts_loaded = summary.parts_loaded,
            inserted = summary.inserted,
            replaced = summary.replaced,
            skipped = summary.skipped,
            unparseable = summary.unparseable,
            failed = summary.failed,
            "descriptor load finished"
        );
        Ok(summary)
    }

    async fn merge(&self, data: PartCreate, force_reload: bool) -> StoreResult<MergeOutcome> {
        // Exact match, so an empty module_id matches an existing empty one.
        let existing = self
            .parts
            .find_one(&Filter::eq("module_id", data.module_id.as_str()))
            .await?;

        match existing {
            None => {
                self.parts.insert(&PartRecord::new(data)).await?;
                Ok(MergeOutcome::Inserted)
            }
            Some(_) if !force_reload => Ok(MergeOutcome::Skipped),
            Some(existing) => {
                let part = existing.refreshed(data);
                self.parts.replace(&existing.id, &part).await?;
                Ok(MergeOutcome::Replaced)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_entry_does_not_hide_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.fzp");
        let b = dir.path().join("b.fzp");
        std::fs::write(&a, "<module/>").unwrap();
        std::fs::write(&b, "<module/>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested.fzp")).unwrap();

        let entries = vec![
            Ok(a.clone()),
            Err(io::Error::new(ErrorKind::PermissionDenied, "stale handle")),
            Ok(dir.path().join("notes.txt")),
            Ok(dir.path().join("nested.fzp")),
            Ok(b.clone()),
        ];
        assert_eq!(keep_descriptors(dir.path(), entries), vec![a, b]);
    }

    #[test]
    fn test_scan_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(&dir.path().join("absent")).unwrap().is_none());
        assert_eq!(scan(dir.path()).unwrap(), Some(Vec::new()));
    }
}
