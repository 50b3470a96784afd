//! Catalog and project services.
//!
//! Plain async functions over typed collections: the HTTP layer calls these
//! with already-decoded payloads and maps the results onto responses.
//! Absence is data (`Option` / `bool`); only validation and store faults are
//! errors.

pub mod parts;
pub mod projects;

use std::path::PathBuf;

use fritzing_model::ValidationError;
use fritzing_storage::{Database, StoreError, StoreResult};

pub use parts::{PartQuery, PartService};
pub use projects::{ProjectQuery, ProjectService};

pub const PARTS_COLLECTION: &str = "fritzing_parts";
pub const PROJECTS_COLLECTION: &str = "projects";

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Both services, wired to one database.
#[derive(Clone)]
pub struct Services {
    pub parts: PartService,
    pub projects: ProjectService,
}

impl Services {
    /// `parts_root` is the descriptor tree; the loader reads `<parts_root>/core`.
    pub fn open(db: &Database, parts_root: impl Into<PathBuf>) -> StoreResult<Self> {
        Ok(Self {
            parts: PartService::new(db.collection(PARTS_COLLECTION)?, parts_root),
            projects: ProjectService::new(db.collection(PROJECTS_COLLECTION)?),
        })
    }
}
