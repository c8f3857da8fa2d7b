//! XML parts.
//!
//! An [`XmlPart`] holds the content of one package part. It starts out as the
//! raw bytes read from the archive and is parsed into an [`XmlDocument`] the
//! first time its tree is needed. Mutable access marks the part dirty so that
//! `save` knows which entries to rewrite.

use crate::common::xml::XmlDocument;
use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::PackURI;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a cached part.
///
/// Every caller asking for the same partname receives a clone of the same
/// handle, so edits made through one are observed by all.
pub type XmlPartRef = Rc<RefCell<XmlPart>>;

#[derive(Debug, Clone)]
enum PartContent {
    Raw(Vec<u8>),
    Parsed(XmlDocument),
}

/// A single XML part of a package.
#[derive(Debug, Clone)]
pub struct XmlPart {
    partname: PackURI,
    content: PartContent,
    dirty: bool,
}

impl XmlPart {
    /// A part backed by bytes read from the archive. Parsing is deferred.
    pub fn from_bytes(partname: PackURI, bytes: Vec<u8>) -> Self {
        Self {
            partname,
            content: PartContent::Raw(bytes),
            dirty: false,
        }
    }

    /// A new part holding `document`. New parts start dirty.
    pub fn new(partname: PackURI, document: XmlDocument) -> Self {
        Self {
            partname,
            content: PartContent::Parsed(document),
            dirty: true,
        }
    }

    /// Wrap the part in a shared handle.
    pub fn into_ref(self) -> XmlPartRef {
        Rc::new(RefCell::new(self))
    }

    #[inline]
    pub fn partname(&self) -> &PackURI {
        &self.partname
    }

    /// Parse the raw bytes if that has not happened yet.
    pub fn materialize(&mut self) -> Result<()> {
        if let PartContent::Raw(bytes) = &self.content {
            let doc = XmlDocument::parse(bytes).map_err(|source| OpcError::MalformedXml {
                partname: self.partname.to_string(),
                source,
            })?;
            self.content = PartContent::Parsed(doc);
        }
        Ok(())
    }

    #[inline]
    pub fn is_materialized(&self) -> bool {
        matches!(self.content, PartContent::Parsed(_))
    }

    /// The parsed document, or `None` while the part is still raw bytes.
    #[inline]
    pub fn parsed(&self) -> Option<&XmlDocument> {
        match &self.content {
            PartContent::Parsed(doc) => Some(doc),
            PartContent::Raw(_) => None,
        }
    }

    /// The parsed document.
    pub fn document(&mut self) -> Result<&XmlDocument> {
        self.materialize()?;
        match &self.content {
            PartContent::Parsed(doc) => Ok(doc),
            PartContent::Raw(_) => unreachable!("materialize leaves the part parsed"),
        }
    }

    /// The parsed document, for editing. Marks the part dirty.
    pub fn document_mut(&mut self) -> Result<&mut XmlDocument> {
        self.materialize()?;
        self.dirty = true;
        match &mut self.content {
            PartContent::Parsed(doc) => Ok(doc),
            PartContent::Raw(_) => unreachable!("materialize leaves the part parsed"),
        }
    }

    /// Replace the whole content. Marks the part dirty.
    pub fn replace(&mut self, document: XmlDocument) {
        self.content = PartContent::Parsed(document);
        self.dirty = true;
    }

    /// Serialized content: the original bytes when the part was never
    /// parsed, otherwise the current tree.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match &self.content {
            PartContent::Raw(bytes) => Ok(bytes.clone()),
            PartContent::Parsed(doc) => doc.to_bytes().map_err(|source| OpcError::MalformedXml {
                partname: self.partname.to_string(),
                source,
            }),
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::xml::XmlElement;

    fn uri() -> PackURI {
        PackURI::new("/xl/workbook.xml").unwrap()
    }

    #[test]
    fn test_lazy_parse() {
        let mut part = XmlPart::from_bytes(uri(), b"<workbook><sheets/></workbook>".to_vec());
        assert!(!part.is_materialized());
        assert!(!part.is_dirty());

        assert_eq!(part.document().unwrap().root().name(), "workbook");
        assert!(part.is_materialized());
        assert!(!part.is_dirty());
    }

    #[test]
    fn test_document_mut_marks_dirty() {
        let mut part = XmlPart::from_bytes(uri(), b"<workbook/>".to_vec());
        part.document_mut()
            .unwrap()
            .root_mut()
            .append(XmlElement::new("sheets"));
        assert!(part.is_dirty());

        let bytes = part.to_bytes().unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("<sheets/>"));

        part.mark_clean();
        assert!(!part.is_dirty());
    }

    #[test]
    fn test_malformed_part() {
        let mut part = XmlPart::from_bytes(uri(), b"<workbook>".to_vec());
        match part.document() {
            Err(OpcError::MalformedXml { partname, .. }) => assert_eq!(partname, "/xl/workbook.xml"),
            other => panic!("expected MalformedXml, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_shared_handle() {
        let handle = XmlPart::new(uri(), XmlDocument::new(XmlElement::new("workbook"))).into_ref();
        let other = Rc::clone(&handle);
        other
            .borrow_mut()
            .document_mut()
            .unwrap()
            .root_mut()
            .set_attribute("x", "1");
        assert_eq!(
            handle.borrow_mut().document().unwrap().root().attribute("x"),
            Some("1")
        );
    }
}
