//! Catalog part records.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{new_record_id, Timestamp};

/// Vendor-specific part attributes (`family`, `package`, `resistance`, ...).
pub type Properties = BTreeMap<String, String>;

/// One electrical pin/pad on a part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorDescriptor {
    /// Local to the owning part; not unique across the catalog.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    /// Element id inside the breadboard-view SVG.
    #[serde(default)]
    pub svg_id: String,
    #[serde(default)]
    pub terminal_id: String,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub id: String,
    /// Natural key from the source descriptor (`<module moduleId=...>`).
    #[serde(default)]
    pub module_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_path: String,
    #[serde(default)]
    pub connectors: Vec<ConnectorDescriptor>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PartRecord {
    /// Build a new record with a fresh id and both timestamps set to now.
    pub fn new(data: PartCreate) -> Self {
        let now = Utc::now();
        Self {
            id: new_record_id(),
            module_id: data.module_id,
            title: data.title,
            description: data.description,
            author: data.author,
            properties: data.properties,
            tags: data.tags,
            image_path: data.image_path,
            connectors: data.connectors,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace every content field with `data`, keeping `id` and
    /// `created_at`, and bump `updated_at`.
    pub fn refreshed(&self, data: PartCreate) -> Self {
        let mut next = Self::new(data);
        next.id = self.id.clone();
        next.created_at = self.created_at;
        if next.updated_at <= self.updated_at {
            next.updated_at = self.updated_at + chrono::Duration::microseconds(1);
        }
        next
    }

    /// `properties.family`, if present.
    pub fn family(&self) -> Option<&str> {
        self.properties.get("family").map(String::as_str)
    }
}

/// Payload for creating a part (also the shape the descriptor parser emits).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartCreate {
    #[serde(default)]
    pub module_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_path: String,
    #[serde(default)]
    pub connectors: Vec<ConnectorDescriptor>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectors: Option<Vec<ConnectorDescriptor>>,
}

impl PartUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.author.is_none()
            && self.properties.is_none()
            && self.tags.is_none()
            && self.image_path.is_none()
            && self.connectors.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PartCreate {
        PartCreate {
            module_id: "ResistorModuleID".to_string(),
            title: "220Ω Resistor".to_string(),
            tags: vec!["Resistor".to_string(), "basic".to_string()],
            ..PartCreate::default()
        }
    }

    #[test]
    fn test_new_record_sets_identity_and_timestamps() {
        let part = PartRecord::new(sample());
        assert!(!part.id.is_empty());
        assert_eq!(part.created_at, part.updated_at);
        assert_eq!(part.module_id, "ResistorModuleID");
    }

    #[test]
    fn test_refreshed_keeps_id_and_created_at() {
        let part = PartRecord::new(sample());
        let mut data = sample();
        data.title = "330Ω Resistor".to_string();

        let next = part.refreshed(data);
        assert_eq!(next.id, part.id);
        assert_eq!(next.created_at, part.created_at);
        assert!(next.updated_at > part.updated_at);
        assert_eq!(next.title, "330Ω Resistor");
    }

    #[test]
    fn test_connector_kind_serializes_as_type() {
        let c = ConnectorDescriptor {
            id: "connector0".to_string(),
            name: "pin 1".to_string(),
            kind: "male".to_string(),
            ..ConnectorDescriptor::default()
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "male");
        assert_eq!(v["svg_id"], "");
    }

    #[test]
    fn test_part_create_requires_only_title() {
        let data: PartCreate = serde_json::from_str(r#"{"title":"LED"}"#).unwrap();
        assert_eq!(data.title, "LED");
        assert!(data.properties.is_empty());
        assert!(serde_json::from_str::<PartCreate>(r#"{"author":"x"}"#).is_err());
    }

    #[test]
    fn test_part_update_skips_absent_fields() {
        let update = PartUpdate {
            title: Some("Red LED".to_string()),
            ..PartUpdate::default()
        };
        let v = serde_json::to_value(&update).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(!update.is_empty());
        assert!(PartUpdate::default().is_empty());
    }
}
