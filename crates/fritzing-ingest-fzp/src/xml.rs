//! Minimal element tree over `quick-xml` events.
//!
//! Descriptor extraction needs "first direct child named X", "every
//! descendant named X in document order" and per-element leading text, so the
//! whole document is materialized once. Descriptors are a few kilobytes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::DescriptorError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Character data before the first child element (CDATA included).
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Leading text, `""` when absent.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Every descendant (not `self`) named `name`, in document order.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.children.iter().rev().collect();
        while let Some(el) = stack.pop() {
            if el.name == name {
                out.push(el);
            }
            stack.extend(el.children.iter().rev());
        }
        out
    }

    pub fn first_descendant(&self, name: &str) -> Option<&Element> {
        self.descendants_named(name).into_iter().next()
    }
}

fn malformed<E: std::fmt::Display>(reader: &Reader<&[u8]>, err: E) -> DescriptorError {
    DescriptorError::Malformed {
        position: reader.buffer_position(),
        message: err.to_string(),
    }
}

fn decode(reader: &Reader<&[u8]>, raw: &[u8]) -> Result<String, DescriptorError> {
    reader
        .decoder()
        .decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| malformed(reader, e))
}

fn open_element(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Element, DescriptorError> {
    let name = decode(reader, start.name().as_ref())?;
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(reader, e))?;
        let key = decode(reader, attr.key.as_ref())?;
        let value = attr
            .decode_and_unescape_value(reader)
            .map_err(|e| malformed(reader, e))?;
        attributes.push((key, value.into_owned()));
    }
    Ok(Element {
        name,
        attributes,
        text: None,
        children: Vec::new(),
    })
}

fn push_text(
    reader: &Reader<&[u8]>,
    stack: &mut [Element],
    text: &str,
) -> Result<(), DescriptorError> {
    match stack.last_mut() {
        Some(current) => {
            // Text after a child element is that child's tail; not needed.
            if current.children.is_empty() {
                current.text.get_or_insert_with(String::new).push_str(text);
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(malformed(reader, "character data outside the root element")),
    }
}

fn attach(
    reader: &Reader<&[u8]>,
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), DescriptorError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
        return Ok(());
    }
    if root.is_some() {
        return Err(malformed(reader, "more than one root element"));
    }
    *root = Some(el);
    Ok(())
}

/// Parse a complete document held as text into its root element.
///
/// The text is already decoded, so an `encoding` declaration is ignored.
pub(crate) fn parse_document(text: &str) -> Result<Element, DescriptorError> {
    build_tree(Reader::from_str(text))
}

/// Parse raw document bytes, decoding them as the byte order mark or the
/// XML declaration says (UTF-8 when neither is present).
pub(crate) fn parse_document_bytes(bytes: &[u8]) -> Result<Element, DescriptorError> {
    build_tree(Reader::from_reader(bytes))
}

fn build_tree(mut reader: Reader<&[u8]>) -> Result<Element, DescriptorError> {
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if root.is_some() && stack.is_empty() {
                    return Err(malformed(&reader, "more than one root element"));
                }
                let el = open_element(&reader, &start)?;
                stack.push(el);
            }
            Ok(Event::Empty(start)) => {
                let el = open_element(&reader, &start)?;
                attach(&reader, &mut stack, &mut root, el)?;
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| malformed(&reader, "closing tag without an open element"))?;
                attach(&reader, &mut stack, &mut root, el)?;
            }
            Ok(Event::Text(t)) => {
                let s = t.unescape().map_err(|e| malformed(&reader, e))?;
                push_text(&reader, &mut stack, &s)?;
            }
            Ok(Event::CData(c)) => {
                let s = decode(&reader, &c)?;
                push_text(&reader, &mut stack, &s)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(&reader, e)),
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(&reader, format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| malformed(&reader, "document has no root element"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_text_and_children() {
        let root = parse_document(
            r#"<?xml version="1.0"?>
            <a x="1">hello &amp; <![CDATA[<raw>]]><b/>tail<c>inner</c></a>"#,
        )
        .unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.text(), "hello & <raw>");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.child("c").map(Element::text), Some("inner"));
        assert_eq!(root.child("b").map(Element::text), Some(""));
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = parse_document(
            r#"<r><x id="1"><x id="2"/></x><y><x id="3"/></y></r>"#,
        )
        .unwrap();
        let ids: Vec<&str> = root
            .descendants_named("x")
            .iter()
            .filter_map(|e| e.attr("id"))
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_bytes_follow_declared_encoding() {
        let mut bytes = br#"<?xml version="1.0" encoding="windows-1252"?><a k="caf"#.to_vec();
        bytes.extend_from_slice(b"\xE9\">\x80 <![CDATA[\xB0C]]></a>");
        let root = parse_document_bytes(&bytes).unwrap();
        assert_eq!(root.attr("k"), Some("caf\u{e9}"));
        assert_eq!(root.text(), "\u{20ac} \u{b0}C");
    }

    #[test]
    fn test_bytes_default_to_utf8() {
        let root = parse_document_bytes("<a>220\u{3a9}</a>".as_bytes()).unwrap();
        assert_eq!(root.text(), "220\u{3a9}");
    }

    #[test]
    fn test_rejects_broken_documents() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a>").is_err());
        assert!(parse_document("").is_err());
        assert!(parse_document("<a/><b/>").is_err());
        assert!(parse_document("<a/>junk").is_err());
    }
}
