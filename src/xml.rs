//! Minimal owned XML tree over `quick-xml` events.
//!
//! WFS documents are small and are inspected by local name only, so a plain
//! element tree is easier to walk than a streaming reader. Namespace prefixes
//! are kept in `name` but every lookup goes through the local part.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Qualified name as written (`gml:Point`).
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Concatenated text content directly under this element.
    pub text: String,
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

impl XmlElement {
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Attribute value by local name (`gml:id` matches `id`).
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| local(k) == local_name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value by exact qualified name.
    pub fn attr_exact(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.local_name() == local_name)
    }

    pub fn children_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children
            .iter()
            .filter(move |c| c.local_name() == local_name)
    }

    /// All descendants (depth-first, document order) with the given local name.
    pub fn descendants(&self, local_name: &str) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        self.collect_descendants(local_name, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, local_name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.local_name() == local_name {
                out.push(child);
            }
            child.collect_descendants(local_name, out);
        }
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text of this element and all descendants, whitespace-joined.
    pub fn deep_text(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ")
    }

    fn collect_text<'a>(&'a self, out: &mut Vec<&'a str>) {
        let t = self.text();
        if !t.is_empty() {
            out.push(t);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

fn decode(bytes: &[u8]) -> Result<String, ParseError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| ParseError::Xml(e.to_string()))
}

fn start_element(e: &BytesStart<'_>) -> Result<XmlElement, ParseError> {
    let mut el = XmlElement {
        name: decode(e.name().as_ref())?,
        ..XmlElement::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::Xml(err.to_string()))?;
        let key = decode(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|err| ParseError::Xml(err.to_string()))?
            .into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

/// Parse a document and return its root element.
pub fn parse(doc: &str) -> Result<XmlElement, ParseError> {
    let mut reader = Reader::from_str(doc);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ParseError::Xml(format!("at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(e) => stack.push(start_element(&e)?),
            Event::Empty(e) => {
                let el = start_element(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| ParseError::Xml("unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| ParseError::Xml("document has no root element".to_string()))
}

/// Escape text for element content or attribute values.
pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}
