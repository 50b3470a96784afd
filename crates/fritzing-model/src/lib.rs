//! Fritzing editor records
//!
//! This crate defines the records the backend persists and the payloads its
//! HTTP surface accepts:
//!
//! - `part`: catalog entries (`PartRecord`) and their electrical connectors,
//!   as produced by descriptor ingestion or direct catalog edits.
//! - `project`: user canvases (`ProjectRecord`) holding placed part instances
//!   and the wires between them.
//! - `validate`: the checks applied to create/update payloads before they
//!   reach the store.
//!
//! Vendor part properties stay an open `String -> String` map and canvas
//! settings stay free-form JSON; neither is given a fixed schema.

pub mod part;
pub mod project;
pub mod validate;

pub use part::{ConnectorDescriptor, PartCreate, PartRecord, PartUpdate, Properties};
pub use project::{
    JsonObject, PartInstance, Position, ProjectCreate, ProjectRecord, ProjectUpdate, WireRecord,
};
pub use validate::ValidationError;

use chrono::{DateTime, Utc};

/// Timestamp type used for `created_at` / `updated_at`.
pub type Timestamp = DateTime<Utc>;

/// Fresh record id (UUID v4, hyphenated).
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
