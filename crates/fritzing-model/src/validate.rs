//! Payload validation applied before records reach the store.
//!
//! The descriptor parser deliberately skips these checks: an ingested part
//! with an empty title is still a catalog entry.

use thiserror::Error;

use crate::{PartCreate, PartUpdate, ProjectCreate, ProjectUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field `{field}` must not be empty")]
    Blank { field: &'static str },
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank { field });
    }
    Ok(())
}

pub fn validate_part_create(data: &PartCreate) -> Result<(), ValidationError> {
    require_text("title", &data.title)
}

pub fn validate_part_update(data: &PartUpdate) -> Result<(), ValidationError> {
    match data.title.as_deref() {
        Some(title) => require_text("title", title),
        None => Ok(()),
    }
}

pub fn validate_project_create(data: &ProjectCreate) -> Result<(), ValidationError> {
    require_text("name", &data.name)
}

pub fn validate_project_update(data: &ProjectUpdate) -> Result<(), ValidationError> {
    match data.name.as_deref() {
        Some(name) => require_text("name", name),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_title_rejected() {
        let data = PartCreate {
            title: "   ".to_string(),
            ..PartCreate::default()
        };
        assert_eq!(
            validate_part_create(&data),
            Err(ValidationError::Blank { field: "title" })
        );
    }

    #[test]
    fn test_update_without_title_is_valid() {
        let data = PartUpdate {
            author: Some("Fritzing Part-o-matic".to_string()),
            ..PartUpdate::default()
        };
        assert!(validate_part_update(&data).is_ok());
    }

    #[test]
    fn test_project_name_checks() {
        let ok = ProjectCreate {
            name: "Blink".to_string(),
            ..ProjectCreate::default()
        };
        assert!(validate_project_create(&ok).is_ok());

        let blank = ProjectUpdate {
            name: Some(String::new()),
            ..ProjectUpdate::default()
        };
        assert!(validate_project_update(&blank).is_err());
    }
}
