//! Project canvases: placed part instances and the wires between them.
//!
//! These are plain data. Updates replace whole fields; there is no merging of
//! instance or wire lists.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{new_record_id, Timestamp};

/// Free-form JSON object (instance properties, canvas settings).
pub type JsonObject = Map<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A part placed on a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartInstance {
    #[serde(default = "new_record_id")]
    pub id: String,
    /// `PartRecord::id` of the catalog entry this instance places.
    pub part_id: String,
    pub position: Position,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub properties: JsonObject,
}

fn default_wire_color() -> String {
    "#ff0000".to_string()
}

/// A wire between two connectors of two placed instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(default = "new_record_id")]
    pub id: String,
    pub from_part_id: String,
    pub from_connector: String,
    pub to_part_id: String,
    pub to_connector: String,
    #[serde(default = "default_wire_color")]
    pub color: String,
    #[serde(default)]
    pub from_pos: Option<Position>,
    #[serde(default)]
    pub to_pos: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parts: Vec<PartInstance>,
    #[serde(default)]
    pub wires: Vec<WireRecord>,
    #[serde(default)]
    pub canvas_settings: JsonObject,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ProjectRecord {
    pub fn new(data: ProjectCreate) -> Self {
        let now = Utc::now();
        Self {
            id: new_record_id(),
            name: data.name,
            description: data.description,
            parts: data.parts,
            wires: data.wires,
            canvas_settings: data.canvas_settings,
            created_at: now,
            updated_at: now,
        }
    }

    /// Payload that recreates this project's content under `name`.
    pub fn duplicate_payload(&self, name: String) -> ProjectCreate {
        ProjectCreate {
            name,
            description: self.description.clone(),
            parts: self.parts.clone(),
            wires: self.wires.clone(),
            canvas_settings: self.canvas_settings.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectCreate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parts: Vec<PartInstance>,
    #[serde(default)]
    pub wires: Vec<WireRecord>,
    #[serde(default)]
    pub canvas_settings: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<PartInstance>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wires: Option<Vec<WireRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_settings: Option<JsonObject>,
}

impl ProjectUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.parts.is_none()
            && self.wires.is_none()
            && self.canvas_settings.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_and_wire_defaults() {
        let json = serde_json::json!({
            "name": "Blink",
            "parts": [{ "part_id": "p1", "position": { "x": 10.0, "y": 20.5 } }],
            "wires": [{
                "from_part_id": "i1", "from_connector": "connector0",
                "to_part_id": "i2", "to_connector": "connector1"
            }]
        });
        let data: ProjectCreate = serde_json::from_value(json).unwrap();

        let instance = &data.parts[0];
        assert!(!instance.id.is_empty());
        assert_eq!(instance.rotation, 0.0);
        assert_eq!(instance.position, Position { x: 10.0, y: 20.5 });

        let wire = &data.wires[0];
        assert!(!wire.id.is_empty());
        assert_eq!(wire.color, "#ff0000");
        assert!(wire.from_pos.is_none());
    }

    #[test]
    fn test_duplicate_payload_copies_content() {
        let mut settings = JsonObject::new();
        settings.insert("zoom".to_string(), Value::from(1.5));
        let original = ProjectRecord::new(ProjectCreate {
            name: "Blink".to_string(),
            description: "LED on pin 13".to_string(),
            canvas_settings: settings,
            ..ProjectCreate::default()
        });

        let copy = original.duplicate_payload("Blink (Copy)".to_string());
        assert_eq!(copy.name, "Blink (Copy)");
        assert_eq!(copy.description, original.description);
        assert_eq!(copy.canvas_settings, original.canvas_settings);
    }
}
