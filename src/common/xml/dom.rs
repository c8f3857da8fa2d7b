//! A small mutable XML tree built on `quick-xml` events.
//!
//! Parts are parsed into an [`XmlDocument`] once and then edited in place by
//! the object model; `to_bytes` writes them back. Text is kept verbatim
//! (including whitespace) so untouched content survives a round trip.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::borrow::Cow;
use thiserror::Error;

/// UTF-8 byte order mark, tolerated at the start of a part.
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Errors produced while parsing or writing XML.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("document has no root element")]
    NoRoot,

    #[error("unexpected content after the root element")]
    TrailingContent,

    #[error("unclosed element <{0}>")]
    Unclosed(String),

    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::events::attributes::AttrError> for XmlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        XmlError::Syntax {
            position: 0,
            message: err.to_string(),
        }
    }
}

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        XmlError::Syntax {
            position: 0,
            message: err.to_string(),
        }
    }
}

/// A node in the element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

impl XmlNode {
    #[inline]
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }
}

/// An element with its qualified name, attributes (in document order) and
/// children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

/// Local part of a qualified name (`r:id` -> `id`).
#[inline]
fn local_part(name: &str) -> &str {
    match name.find(':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

impl XmlElement {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.append(child);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.set_text(text);
        self
    }

    /// Qualified name, including any prefix.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Attribute value by qualified name (`r:id`, `name`, ...).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value by local name, ignoring the prefix.
    ///
    /// Used for attributes like `r:id` whose prefix is chosen by the producer.
    pub fn attribute_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.contains(':') && local_part(k) == local)
            .or_else(|| self.attributes.iter().find(|(k, _)| k == local))
            .map(|(_, v)| v.as_str())
    }

    /// Prefix this element binds to namespace `uri`: `Some("")` for the
    /// default namespace, `Some("r")` for `xmlns:r`, `None` if unbound here.
    pub fn namespace_prefix(&self, uri: &str) -> Option<&str> {
        self.attributes.iter().find_map(|(k, v)| {
            if v != uri {
                return None;
            }
            if k == "xmlns" {
                Some("")
            } else {
                k.strip_prefix("xmlns:")
            }
        })
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(pos).1)
    }

    #[inline]
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    #[inline]
    pub fn children_mut(&mut self) -> &mut Vec<XmlNode> {
        &mut self.children
    }

    /// Child elements, skipping text and comments.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    /// First child element with the given local name.
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.local_name() == local)
    }

    /// First child element matching `name`'s local part, appending a new
    /// `name` element when there is none.
    pub fn child_or_insert(&mut self, name: &str) -> &mut XmlElement {
        let local = local_part(name);
        let idx = match self
            .children
            .iter()
            .position(|n| n.as_element().is_some_and(|e| e.local_name() == local))
        {
            Some(idx) => idx,
            None => {
                self.children.push(XmlNode::Element(XmlElement::new(name)));
                self.children.len() - 1
            },
        };
        match &mut self.children[idx] {
            XmlNode::Element(e) => e,
            _ => unreachable!("index points at an element node"),
        }
    }

    pub fn append(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Insert `child` before the `index`-th child element (counting elements
    /// only). Appends when `index` is past the end.
    pub fn insert_element(&mut self, index: usize, child: XmlElement) {
        let pos = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, n)| n.as_element().is_some())
            .nth(index)
            .map(|(pos, _)| pos)
            .unwrap_or(self.children.len());
        self.children.insert(pos, XmlNode::Element(child));
    }

    /// Remove the `index`-th child element (counting elements only).
    pub fn remove_element(&mut self, index: usize) -> Option<XmlElement> {
        let pos = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, n)| n.as_element().is_some())
            .nth(index)
            .map(|(pos, _)| pos)?;
        match self.children.remove(pos) {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Keep only child elements for which `keep` returns true; text and
    /// comments are untouched. Returns the number of removed elements.
    pub fn retain_elements<F: FnMut(&XmlElement) -> bool>(&mut self, mut keep: F) -> usize {
        let before = self.children.len();
        self.children.retain(|n| match n {
            XmlNode::Element(e) => keep(e),
            _ => true,
        });
        before - self.children.len()
    }

    /// Concatenated text and CDATA content of the direct children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                _ => {},
            }
        }
        out
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text.to_string()));
        }
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write_to(writer)?,
                XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
                XmlNode::CData(t) => writer.write_event(Event::CData(BytesCData::new(t.as_str())))?,
                XmlNode::Comment(t) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped(t.as_str())))?
                },
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

/// The XML declaration of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: String,
    pub standalone: Option<String>,
}

impl Default for XmlDeclaration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            standalone: Some("yes".to_string()),
        }
    }
}

/// A parsed XML document: optional declaration plus one root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    declaration: Option<XmlDeclaration>,
    root: XmlElement,
}

impl XmlDocument {
    /// A new document with a standard `standalone="yes"` declaration.
    pub fn new(root: XmlElement) -> Self {
        Self {
            declaration: Some(XmlDeclaration::default()),
            root,
        }
    }

    /// Parse a UTF-8 document. A leading UTF-8 BOM is skipped.
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let bytes = bytes.strip_prefix(&UTF8_BOM[..]).unwrap_or(bytes);
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut declaration = None;
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event().map_err(|e| XmlError::Syntax {
                position: reader.buffer_position() as u64,
                message: e.to_string(),
            })?;

            match event {
                Event::Decl(d) => {
                    let version = String::from_utf8_lossy(&d.version()?).into_owned();
                    let standalone = match d.standalone() {
                        Some(s) => Some(String::from_utf8_lossy(&s?).into_owned()),
                        None => None,
                    };
                    declaration = Some(XmlDeclaration {
                        version,
                        standalone,
                    });
                },
                Event::Start(e) => {
                    if root.is_some() {
                        return Err(XmlError::TrailingContent);
                    }
                    stack.push(element_from_start(&e, &reader)?);
                },
                Event::Empty(e) => {
                    if root.is_some() {
                        return Err(XmlError::TrailingContent);
                    }
                    let element = element_from_start(&e, &reader)?;
                    match stack.last_mut() {
                        Some(parent) => parent.append(element),
                        None => root = Some(element),
                    }
                },
                Event::End(_) => {
                    // quick-xml checks that end names match their start tags.
                    let Some(element) = stack.pop() else {
                        return Err(XmlError::Syntax {
                            position: reader.buffer_position() as u64,
                            message: "unexpected end tag".to_string(),
                        });
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.append(element),
                        None => root = Some(element),
                    }
                },
                Event::Text(t) => {
                    let text = t.unescape()?;
                    match stack.last_mut() {
                        Some(parent) => push_text(parent, text),
                        None if text.trim().is_empty() => {},
                        None => return Err(XmlError::TrailingContent),
                    }
                },
                Event::CData(c) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = std::str::from_utf8(c.as_ref())?;
                        parent.children.push(XmlNode::CData(text.to_string()));
                    }
                },
                Event::Comment(c) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = std::str::from_utf8(c.as_ref())?;
                        parent.children.push(XmlNode::Comment(text.to_string()));
                    }
                },
                Event::Eof => break,
                _ => {},
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Unclosed(open.name));
        }
        let root = root.ok_or(XmlError::NoRoot)?;
        Ok(Self { declaration, root })
    }

    /// Serialize to UTF-8 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new(Vec::with_capacity(1024));
        if let Some(decl) = &self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new(
                &decl.version,
                Some("UTF-8"),
                decl.standalone.as_deref(),
            )))?;
            writer.get_mut().extend_from_slice(b"\r\n");
        }
        self.root.write_to(&mut writer)?;
        Ok(writer.into_inner())
    }

    #[inline]
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    #[inline]
    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    pub fn declaration(&self) -> Option<&XmlDeclaration> {
        self.declaration.as_ref()
    }
}

fn element_from_start(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<XmlElement, XmlError> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?;
        element.attributes.push((key.to_string(), value.into_owned()));
    }
    Ok(element)
}

/// Append text, merging with a preceding text node.
fn push_text(parent: &mut XmlElement, text: Cow<'_, str>) {
    if let Some(XmlNode::Text(prev)) = parent.children.last_mut() {
        prev.push_str(&text);
    } else {
        parent.children.push(XmlNode::Text(text.into_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_and_access() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns:r="urn:r"><sheets><sheet name="A &amp; B" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let sheets = doc.root().child("sheets").unwrap();
        let sheet = sheets.elements().next().unwrap();
        assert_eq!(sheet.attribute("name"), Some("A & B"));
        assert_eq!(sheet.attribute_local("id"), Some("rId1"));
        assert_eq!(doc.declaration().unwrap().standalone.as_deref(), Some("yes"));
        assert_eq!(doc.root().namespace_prefix("urn:r"), Some("r"));
        assert_eq!(doc.root().namespace_prefix("urn:other"), None);
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let xml = br#"<?xml version="1.0"?><root a="1"><t xml:space="preserve"> x &lt; y </t><!--c--><e/></root>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let bytes = doc.to_bytes().unwrap();
        let again = XmlDocument::parse(&bytes).unwrap();
        assert_eq!(doc.root(), again.root());
        assert_eq!(again.root().child("t").unwrap().text(), " x < y ");
    }

    #[test]
    fn test_bom_is_skipped() {
        let mut xml = UTF8_BOM.to_vec();
        xml.extend_from_slice(b"<root/>");
        assert_eq!(XmlDocument::parse(&xml).unwrap().root().name(), "root");
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(XmlDocument::parse(b"").is_err());
        assert!(XmlDocument::parse(b"<a><b></a>").is_err());
        assert!(XmlDocument::parse(b"<a>").is_err());
        assert!(XmlDocument::parse(b"<a/><b/>").is_err());
        assert!(XmlDocument::parse(b"not xml at all").is_err());
    }

    #[test]
    fn test_mutation_helpers() {
        let mut root = XmlElement::new("sheets");
        root.append(XmlElement::new("sheet").with_attribute("name", "A"));
        root.append(XmlElement::new("sheet").with_attribute("name", "C"));
        root.insert_element(1, XmlElement::new("sheet").with_attribute("name", "B"));

        let names: Vec<_> = root.elements().filter_map(|e| e.attribute("name")).collect();
        assert_eq!(names, ["A", "B", "C"]);

        let removed = root.retain_elements(|e| e.attribute("name") != Some("B"));
        assert_eq!(removed, 1);
        assert_eq!(root.remove_element(0).unwrap().attribute("name"), Some("A"));

        let child = root.child_or_insert("x:views");
        child.set_attribute("active", "0");
        assert!(root.child("views").is_some());
    }

    proptest! {
        #[test]
        fn prop_text_and_attributes_survive_serialization(
            text in "[a-zA-Z0-9 <>&'\"]{1,24}",
            value in "[a-zA-Z0-9 <>&'\"]{0,24}",
        ) {
            let root = XmlElement::new("root")
                .with_child(XmlElement::new("t").with_attribute("v", &value).with_text(&text));
            let bytes = XmlDocument::new(root).to_bytes().unwrap();
            let parsed = XmlDocument::parse(&bytes).unwrap();
            let t = parsed.root().child("t").unwrap();
            prop_assert_eq!(t.text(), text);
            prop_assert_eq!(t.attribute("v"), Some(value.as_str()));
        }
    }
}
