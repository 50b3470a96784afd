//! `.fzp` descriptor parser.
//!
//! Every field is optional. A descriptor only fails to parse when the markup
//! is broken, the file cannot be read, or the root element is not `module`.

use std::collections::BTreeMap;
use std::path::Path;

use fritzing_model::{ConnectorDescriptor, PartCreate};

use crate::xml::{parse_document, parse_document_bytes, Element};
use crate::DescriptorError;

/// Prefix joined with the breadboard `layers/@image` attribute.
pub const IMAGE_PREFIX: &str = "/parts/svg/core/";

const ROOT_TAG: &str = "module";
const BREADBOARD_VIEW: &str = "breadboardView";

/// Parse descriptor text into a part payload.
pub fn parse_descriptor(text: &str) -> Result<PartCreate, DescriptorError> {
    module(parse_document(text)?)
}

/// Parse raw descriptor bytes, honoring the XML `encoding` declaration.
pub fn parse_descriptor_bytes(bytes: &[u8]) -> Result<PartCreate, DescriptorError> {
    module(parse_document_bytes(bytes)?)
}

/// Read and parse one descriptor file.
pub fn parse_descriptor_file(path: &Path) -> Result<PartCreate, DescriptorError> {
    let bytes = std::fs::read(path)?;
    parse_descriptor_bytes(&bytes)
}

fn module(root: Element) -> Result<PartCreate, DescriptorError> {
    if root.name != ROOT_TAG {
        return Err(DescriptorError::NotAModule { root: root.name });
    }
    Ok(extract(&root))
}

fn child_text(root: &Element, name: &str) -> String {
    root.child(name).map(Element::text).unwrap_or("").to_string()
}

fn extract(root: &Element) -> PartCreate {
    PartCreate {
        module_id: root.attr("moduleId").unwrap_or("").to_string(),
        title: child_text(root, "title"),
        description: child_text(root, "description"),
        author: child_text(root, "author"),
        properties: extract_properties(root),
        tags: extract_tags(root),
        image_path: extract_image_path(root),
        connectors: root
            .descendants_named("connector")
            .into_iter()
            .map(extract_connector)
            .collect(),
    }
}

fn extract_properties(root: &Element) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    let Some(container) = root.child("properties") else {
        return properties;
    };
    for prop in container.children_named("property") {
        let name = prop.attr("name").unwrap_or("");
        let value = prop.text();
        if name.is_empty() || value.is_empty() {
            continue;
        }
        properties.insert(name.to_string(), value.to_string());
    }
    properties
}

fn extract_tags(root: &Element) -> Vec<String> {
    root.child("tags")
        .map(|tags| {
            tags.children_named("tag")
                .map(Element::text)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn extract_image_path(root: &Element) -> String {
    root.first_descendant(BREADBOARD_VIEW)
        .and_then(|view| view.child("layers"))
        .and_then(|layers| layers.attr("image"))
        .filter(|image| !image.is_empty())
        .map(|image| format!("{IMAGE_PREFIX}{image}"))
        .unwrap_or_default()
}

fn extract_connector(el: &Element) -> ConnectorDescriptor {
    // First `p` under any breadboardView nested in this connector.
    let point = el
        .descendants_named(BREADBOARD_VIEW)
        .into_iter()
        .find_map(|view| view.child("p"));

    ConnectorDescriptor {
        id: el.attr("id").unwrap_or("").to_string(),
        name: el.attr("name").unwrap_or("").to_string(),
        kind: el.attr("type").unwrap_or("").to_string(),
        description: child_text(el, "description"),
        svg_id: point.and_then(|p| p.attr("svgId")).unwrap_or("").to_string(),
        terminal_id: point
            .and_then(|p| p.attr("terminalId"))
            .unwrap_or("")
            .to_string(),
    }
}
