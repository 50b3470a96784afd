//! Projects: saved circuits, newest first.

use fritzing_model::{validate, ProjectCreate, ProjectRecord, ProjectUpdate};
use fritzing_storage::{to_document, Collection, Filter, FindOptions, Sort};

use crate::parts::timestamp_now;
use crate::{CatalogResult, DEFAULT_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectQuery {
    pub skip: usize,
    pub limit: usize,
}

impl Default for ProjectQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Clone)]
pub struct ProjectService {
    projects: Collection<ProjectRecord>,
}

impl ProjectService {
    pub fn new(projects: Collection<ProjectRecord>) -> Self {
        Self { projects }
    }

    /// Most recently updated first.
    pub async fn list_projects(&self, query: &ProjectQuery) -> CatalogResult<Vec<ProjectRecord>> {
        let options = FindOptions::page(query.skip, query.limit)
            .sorted_by(Sort::descending("updated_at"));
        Ok(self.projects.find_many(&Filter::All, &options).await?)
    }

    pub async fn get_project(&self, id: &str) -> CatalogResult<Option<ProjectRecord>> {
        Ok(self.projects.find_by_id(id).await?)
    }

    pub async fn create_project(&self, data: ProjectCreate) -> CatalogResult<ProjectRecord> {
        validate::validate_project_create(&data)?;
        let project = ProjectRecord::new(data);
        self.projects.insert(&project).await?;
        tracing::debug!(id = %project.id, name = %project.name, "created project");
        Ok(project)
    }

    pub async fn update_project(
        &self,
        id: &str,
        update: ProjectUpdate,
    ) -> CatalogResult<Option<ProjectRecord>> {
        validate::validate_project_update(&update)?;
        if update.is_empty() {
            return self.get_project(id).await;
        }

        let mut fields = to_document(&update)?;
        fields.insert("updated_at".to_string(), timestamp_now()?);
        if self.projects.update_fields(id, fields).await? == 0 {
            return Ok(None);
        }
        self.get_project(id).await
    }

    pub async fn delete_project(&self, id: &str) -> CatalogResult<bool> {
        Ok(self.projects.delete(id).await? > 0)
    }

    /// Copy a project's content into a new record. The copy is named
    /// `new_name`, or `"<name> (Copy)"` when none is given.
    pub async fn duplicate_project(
        &self,
        id: &str,
        new_name: Option<String>,
    ) -> CatalogResult<Option<ProjectRecord>> {
        let Some(original) = self.get_project(id).await? else {
            return Ok(None);
        };
        let name = new_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{} (Copy)", original.name));
        let copy = self.create_project(original.duplicate_payload(name)).await?;
        Ok(Some(copy))
    }
}
