//! The `[Content_Types].xml` registry.
//!
//! Content types are declared either as a *default* for a file extension or
//! as an *override* for one partname. Lookup checks the override first and
//! falls back to the default for the (lower-cased) extension.

use crate::common::xml::{XmlDocument, XmlElement};
use crate::opc::constants::namespace;
use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::PackURI;
use std::collections::BTreeMap;

/// Default and override content-type declarations of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypeRegistry {
    /// Lower-cased extension -> content type.
    defaults: BTreeMap<String, String>,
    /// Partname -> content type.
    overrides: BTreeMap<PackURI, String>,
}

impl ContentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `[Content_Types].xml`.
    pub fn from_xml(doc: &XmlDocument) -> Result<Self> {
        let root = doc.root();
        if root.local_name() != "Types" {
            return Err(OpcError::UnknownContentType(format!(
                "expected <Types> root, found <{}>",
                root.name()
            )));
        }

        let mut registry = Self::new();
        for element in root.elements() {
            match element.local_name() {
                "Default" => {
                    if let (Some(ext), Some(ct)) =
                        (element.attribute("Extension"), element.attribute("ContentType"))
                    {
                        registry.add_default(ext, ct);
                    }
                },
                "Override" => {
                    if let (Some(partname), Some(ct)) =
                        (element.attribute("PartName"), element.attribute("ContentType"))
                    {
                        registry.add_override(PackURI::new(partname)?, ct);
                    }
                },
                _ => {},
            }
        }
        Ok(registry)
    }

    /// Build `[Content_Types].xml`: defaults first, then overrides.
    pub fn to_xml(&self) -> XmlDocument {
        let mut root = XmlElement::new("Types").with_attribute("xmlns", namespace::OPC_CONTENT_TYPES);
        for (ext, ct) in &self.defaults {
            root.append(
                XmlElement::new("Default")
                    .with_attribute("Extension", ext)
                    .with_attribute("ContentType", ct),
            );
        }
        for (partname, ct) in &self.overrides {
            root.append(
                XmlElement::new("Override")
                    .with_attribute("PartName", partname.as_str())
                    .with_attribute("ContentType", ct),
            );
        }
        XmlDocument::new(root)
    }

    pub fn add_default(&mut self, ext: &str, content_type: &str) {
        self.defaults
            .insert(ext.to_ascii_lowercase(), content_type.to_string());
    }

    pub fn add_override(&mut self, partname: PackURI, content_type: &str) {
        self.overrides.insert(partname, content_type.to_string());
    }

    /// Make `partname` resolve to `content_type`.
    ///
    /// When the extension default already yields `content_type`, no override
    /// is needed and any stale override for the partname is dropped.
    pub fn ensure_type(&mut self, partname: &PackURI, content_type: &str) {
        let default = self.defaults.get(&partname.ext().to_ascii_lowercase());
        if default.is_some_and(|ct| ct == content_type) {
            self.overrides.remove(partname);
        } else {
            self.add_override(partname.clone(), content_type);
        }
    }

    /// Content type of `partname`: override, then extension default.
    pub fn type_of(&self, partname: &PackURI) -> Result<&str> {
        if let Some(ct) = self.overrides.get(partname) {
            return Ok(ct);
        }
        self.defaults
            .get(&partname.ext().to_ascii_lowercase())
            .map(String::as_str)
            .ok_or_else(|| OpcError::UnknownContentType(partname.to_string()))
    }

    /// Drop the override for `partname`. Defaults are never removed.
    pub fn remove(&mut self, partname: &PackURI) -> Option<String> {
        self.overrides.remove(partname)
    }

    pub fn has_override(&self, partname: &PackURI) -> bool {
        self.overrides.contains_key(partname)
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&PackURI, &str)> {
        self.overrides.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defaults.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
