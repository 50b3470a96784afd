//! Part catalog: listing, search, families and CRUD over `fritzing_parts`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use fritzing_ingest_fzp::{CatalogLoader, LoadSummary};
use fritzing_model::{validate, PartCreate, PartRecord, PartUpdate};
use fritzing_storage::{to_document, Collection, Filter, FindOptions, StoreError};
use serde_json::Value;

use crate::{CatalogResult, DEFAULT_LIMIT};

/// Fields searched by the free-text `search` parameter.
const SEARCH_FIELDS: [&str; 3] = ["title", "description", "tags"];

/// Sentinel family value meaning "no family filter".
pub const ALL_FAMILIES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartQuery {
    pub skip: usize,
    pub limit: usize,
    pub search: Option<String>,
    pub family: Option<String>,
}

impl Default for PartQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
            search: None,
            family: None,
        }
    }
}

impl PartQuery {
    fn filter(&self) -> Result<Filter, StoreError> {
        let mut clauses = Vec::new();

        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let any_field = SEARCH_FIELDS
                .iter()
                .map(|field| Filter::contains_ignore_case(*field, search))
                .collect::<Result<Vec<_>, _>>()?;
            clauses.push(Filter::or(any_field));
        }

        if let Some(family) = self
            .family
            .as_deref()
            .filter(|f| !f.is_empty() && *f != ALL_FAMILIES)
        {
            clauses.push(Filter::contains_ignore_case("properties.family", family)?);
        }

        Ok(Filter::and(clauses))
    }
}

#[derive(Clone)]
pub struct PartService {
    parts: Collection<PartRecord>,
    parts_root: PathBuf,
}

impl PartService {
    pub fn new(parts: Collection<PartRecord>, parts_root: impl Into<PathBuf>) -> Self {
        Self {
            parts,
            parts_root: parts_root.into(),
        }
    }

    pub fn parts_root(&self) -> &Path {
        &self.parts_root
    }

    /// Directory the loader reads descriptors from.
    pub fn descriptor_dir(&self) -> PathBuf {
        self.parts_root.join("core")
    }

    /// Matching parts in storage order.
    pub async fn list_parts(&self, query: &PartQuery) -> CatalogResult<Vec<PartRecord>> {
        let filter = query.filter()?;
        let parts = self
            .parts
            .find_many(&filter, &FindOptions::page(query.skip, query.limit))
            .await?;
        Ok(parts)
    }

    /// Distinct non-empty `properties.family` values, sorted.
    pub async fn part_families(&self) -> CatalogResult<Vec<String>> {
        let values = self.parts.distinct("properties.family").await?;
        Ok(values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect())
    }

    pub async fn get_part(&self, id: &str) -> CatalogResult<Option<PartRecord>> {
        Ok(self.parts.find_by_id(id).await?)
    }

    pub async fn create_part(&self, data: PartCreate) -> CatalogResult<PartRecord> {
        validate::validate_part_create(&data)?;
        let part = PartRecord::new(data);
        self.parts.insert(&part).await?;
        tracing::debug!(id = %part.id, module_id = %part.module_id, "created part");
        Ok(part)
    }

    /// Apply the present fields of `update`. `None` when the part does not exist.
    pub async fn update_part(
        &self,
        id: &str,
        update: PartUpdate,
    ) -> CatalogResult<Option<PartRecord>> {
        validate::validate_part_update(&update)?;
        if update.is_empty() {
            return self.get_part(id).await;
        }

        let mut fields = to_document(&update)?;
        fields.insert("updated_at".to_string(), timestamp_now()?);
        if self.parts.update_fields(id, fields).await? == 0 {
            return Ok(None);
        }
        self.get_part(id).await
    }

    /// `true` when a part was removed.
    pub async fn delete_part(&self, id: &str) -> CatalogResult<bool> {
        Ok(self.parts.delete(id).await? > 0)
    }

    /// Run the descriptor loader against `<parts_root>/core`.
    pub async fn load_fritzing_parts(&self, force_reload: bool) -> CatalogResult<LoadSummary> {
        let dir = self.descriptor_dir();
        let summary = CatalogLoader::new(self.parts.clone())
            .load(&dir, force_reload)
            .await?;
        Ok(summary)
    }
}

pub(crate) fn timestamp_now() -> Result<Value, StoreError> {
    Ok(serde_json::to_value(Utc::now())?)
}
