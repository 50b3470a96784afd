//! Fritzing part descriptor ingestion.
//!
//! - `descriptor`: turns one `.fzp` XML document into a `PartCreate`, or an
//!   explicit `DescriptorError` when the document cannot be interpreted as a
//!   module.
//! - `loader`: walks a descriptor directory and merges the parsed parts into
//!   the catalog collection (insert / skip / replace by `module_id`).
//!
//! Descriptors are untrusted input: a bad file never aborts a load.

pub mod descriptor;
pub mod loader;
mod xml;

pub use descriptor::{parse_descriptor, parse_descriptor_bytes, parse_descriptor_file, IMAGE_PREFIX};
pub use loader::{descriptor_files, CatalogLoader, LoadSummary, DESCRIPTOR_EXTENSION};

/// Why a descriptor was not parseable.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed XML near byte {position}: {message}")]
    Malformed { position: usize, message: String },
    #[error("root element is <{root}>, expected <module>")]
    NotAModule { root: String },
}
