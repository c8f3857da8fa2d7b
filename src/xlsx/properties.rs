//! Core and extended document properties.
//!
//! Core properties live in `docProps/core.xml` (Dublin Core plus a few OPC
//! terms), extended ones in `docProps/app.xml`. Both are flat lists of
//! simple elements, so every property is read and written as a string.
//!
//! `app.xml` also carries the list of sheet titles (`TitlesOfParts`, counted
//! per group in `HeadingPairs`); the helpers at the bottom keep that list in
//! step with the workbook.

use crate::common::xml::{XmlDocument, XmlElement};
use crate::opc::constants::namespace;
use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;

/// Which part a property is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyPart {
    /// `docProps/core.xml`
    Core,
    /// `docProps/app.xml`
    App,
}

/// A document property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Title,
    Subject,
    Creator,
    Keywords,
    Description,
    LastModifiedBy,
    LastPrinted,
    CreationDate,
    ModificationDate,
    Category,
    Application,
    DocSecurity,
    ScaleCrop,
    Manager,
    Company,
    LinksUpToDate,
    SharedDoc,
    HyperlinkBase,
    HyperlinksChanged,
    AppVersion,
}

impl Property {
    pub const ALL: [Property; 20] = [
        Property::Title,
        Property::Subject,
        Property::Creator,
        Property::Keywords,
        Property::Description,
        Property::LastModifiedBy,
        Property::LastPrinted,
        Property::CreationDate,
        Property::ModificationDate,
        Property::Category,
        Property::Application,
        Property::DocSecurity,
        Property::ScaleCrop,
        Property::Manager,
        Property::Company,
        Property::LinksUpToDate,
        Property::SharedDoc,
        Property::HyperlinkBase,
        Property::HyperlinksChanged,
        Property::AppVersion,
    ];

    pub fn part(self) -> PropertyPart {
        match self {
            Property::Title
            | Property::Subject
            | Property::Creator
            | Property::Keywords
            | Property::Description
            | Property::LastModifiedBy
            | Property::LastPrinted
            | Property::CreationDate
            | Property::ModificationDate
            | Property::Category => PropertyPart::Core,
            _ => PropertyPart::App,
        }
    }

    /// Element name without prefix.
    pub fn local_name(self) -> &'static str {
        match self {
            Property::Title => "title",
            Property::Subject => "subject",
            Property::Creator => "creator",
            Property::Keywords => "keywords",
            Property::Description => "description",
            Property::LastModifiedBy => "lastModifiedBy",
            Property::LastPrinted => "lastPrinted",
            Property::CreationDate => "created",
            Property::ModificationDate => "modified",
            Property::Category => "category",
            Property::Application => "Application",
            Property::DocSecurity => "DocSecurity",
            Property::ScaleCrop => "ScaleCrop",
            Property::Manager => "Manager",
            Property::Company => "Company",
            Property::LinksUpToDate => "LinksUpToDate",
            Property::SharedDoc => "SharedDoc",
            Property::HyperlinkBase => "HyperlinkBase",
            Property::HyperlinksChanged => "HyperlinksChanged",
            Property::AppVersion => "AppVersion",
        }
    }

    /// Namespace URI and the prefix Office conventionally binds to it.
    fn namespace(self) -> (&'static str, &'static str) {
        match self {
            Property::Title
            | Property::Subject
            | Property::Creator
            | Property::Keywords
            | Property::Description => (namespace::DC, "dc"),
            Property::CreationDate | Property::ModificationDate => (namespace::DC_TERMS, "dcterms"),
            Property::LastModifiedBy | Property::LastPrinted | Property::Category => {
                (namespace::CORE_PROPERTIES, "cp")
            },
            _ => (namespace::EXTENDED_PROPERTIES, ""),
        }
    }

    fn is_w3cdtf(self) -> bool {
        matches!(self, Property::CreationDate | Property::ModificationDate)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.local_name())
    }
}

impl FromStr for Property {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Property::ALL
            .into_iter()
            .find(|p| p.local_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown property: {}", s))
    }
}

/// Current time in the W3CDTF form used by `dcterms:created`.
pub fn w3cdtf_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn find_property<'a>(root: &'a XmlElement, prop: Property) -> Option<&'a XmlElement> {
    root.elements().find(|e| e.local_name() == prop.local_name())
}

/// Whether `prop` has an element, even an empty one.
pub fn contains(doc: &XmlDocument, prop: Property) -> bool {
    find_property(doc.root(), prop).is_some()
}

/// Value of `prop`, or an empty string when absent.
pub fn read(doc: &XmlDocument, prop: Property) -> String {
    find_property(doc.root(), prop)
        .map(XmlElement::text)
        .unwrap_or_default()
}

/// Set `prop`, creating its element when missing.
pub fn write(doc: &mut XmlDocument, prop: Property, value: &str) {
    let root = doc.root_mut();
    if let Some(element) = root
        .elements_mut()
        .find(|e| e.local_name() == prop.local_name())
    {
        element.set_text(value);
        return;
    }

    let (uri, conventional) = prop.namespace();
    let prefix = match root.namespace_prefix(uri) {
        Some(prefix) => prefix.to_string(),
        None => {
            root.set_attribute(&format!("xmlns:{}", conventional), uri);
            conventional.to_string()
        },
    };
    let name = if prefix.is_empty() {
        prop.local_name().to_string()
    } else {
        format!("{}:{}", prefix, prop.local_name())
    };

    let mut element = XmlElement::new(name).with_text(value);
    if prop.is_w3cdtf() {
        let xsi = match root.namespace_prefix(namespace::XSI) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => {
                root.set_attribute("xmlns:xsi", namespace::XSI);
                "xsi".to_string()
            },
        };
        let dcterms = root.namespace_prefix(namespace::DC_TERMS).unwrap_or("dcterms");
        element.set_attribute(&format!("{}:type", xsi), &format!("{}:W3CDTF", dcterms));
    }
    root.append(element);
}

/// Remove `prop`. Returns whether it was present.
pub fn remove(doc: &mut XmlDocument, prop: Property) -> bool {
    doc.root_mut()
        .retain_elements(|e| e.local_name() != prop.local_name())
        > 0
}

/// Name of the `HeadingPairs` group that counts worksheet titles.
const WORKSHEETS_GROUP: &str = "Worksheets";

fn vector<'a>(root: &'a XmlElement, container: &str) -> Option<&'a XmlElement> {
    root.child(container)?.child("vector")
}

fn vector_mut<'a>(root: &'a mut XmlElement, container: &str) -> Option<&'a mut XmlElement> {
    root.child_mut(container)?.child_mut("vector")
}

/// Offset of the worksheet titles in `TitlesOfParts`, their count, and the
/// position of the count element in the `HeadingPairs` vector.
fn worksheet_titles(root: &XmlElement) -> Option<(usize, usize, usize)> {
    let pairs: Vec<&XmlElement> = vector(root, "HeadingPairs")?.elements().collect();
    let mut offset = 0;
    for (i, chunk) in pairs.chunks(2).enumerate() {
        let [label, count] = chunk else {
            return None;
        };
        let label = label.elements().next().map(XmlElement::text).unwrap_or_default();
        let count = count
            .elements()
            .next()
            .and_then(|e| atoi_simd::parse::<usize>(e.text().trim().as_bytes()).ok())
            .unwrap_or(0);
        if label == WORKSHEETS_GROUP {
            return Some((offset, count, i * 2 + 1));
        }
        offset += count;
    }
    None
}

fn set_worksheet_count(root: &mut XmlElement, count_index: usize, count: usize) {
    let Some(pairs) = vector_mut(root, "HeadingPairs") else {
        return;
    };
    if let Some(variant) = pairs.elements_mut().nth(count_index) {
        if let Some(value) = variant.elements_mut().next() {
            value.set_text(itoa::Buffer::new().format(count));
        }
    }
}

fn refresh_size(vector: &mut XmlElement) {
    let size = vector.elements().count();
    vector.set_attribute("size", itoa::Buffer::new().format(size));
}

/// Insert `title` at sheet position `index` (appending when past the end).
pub(crate) fn insert_sheet_title(doc: &mut XmlDocument, index: usize, title: &str) {
    let root = doc.root_mut();
    let Some((offset, count, count_index)) = worksheet_titles(root) else {
        return;
    };
    let vt = root
        .namespace_prefix(namespace::DOC_PROPS_VTYPES)
        .filter(|p| !p.is_empty())
        .unwrap_or("vt")
        .to_string();
    let Some(titles) = vector_mut(root, "TitlesOfParts") else {
        return;
    };
    titles.insert_element(
        offset + index.min(count),
        XmlElement::new(format!("{}:lpstr", vt)).with_text(title),
    );
    refresh_size(titles);
    set_worksheet_count(root, count_index, count + 1);
}

/// Remove `title` from the worksheet titles.
pub(crate) fn remove_sheet_title(doc: &mut XmlDocument, title: &str) {
    let root = doc.root_mut();
    let Some((offset, count, count_index)) = worksheet_titles(root) else {
        return;
    };
    let Some(titles) = vector_mut(root, "TitlesOfParts") else {
        return;
    };
    let Some(pos) = titles
        .elements()
        .skip(offset)
        .take(count)
        .position(|e| e.text() == title)
    else {
        return;
    };
    titles.remove_element(offset + pos);
    refresh_size(titles);
    set_worksheet_count(root, count_index, count - 1);
}

/// Rename a worksheet title in place.
pub(crate) fn rename_sheet_title(doc: &mut XmlDocument, old: &str, new: &str) {
    let root = doc.root_mut();
    let Some((offset, count, _)) = worksheet_titles(root) else {
        return;
    };
    if let Some(titles) = vector_mut(root, "TitlesOfParts") {
        if let Some(element) = titles
            .elements_mut()
            .skip(offset)
            .take(count)
            .find(|e| e.text() == old)
        {
            element.set_text(new);
        }
    }
}

/// Move the worksheet title at `from` to position `to`.
pub(crate) fn move_sheet_title(doc: &mut XmlDocument, from: usize, to: usize) {
    let root = doc.root_mut();
    let Some((offset, count, _)) = worksheet_titles(root) else {
        return;
    };
    if from >= count || to >= count {
        return;
    }
    if let Some(titles) = vector_mut(root, "TitlesOfParts") {
        if let Some(element) = titles.remove_element(offset + from) {
            titles.insert_element(offset + to, element);
        }
    }
}

/// Worksheet titles listed in `app.xml`.
pub fn sheet_titles(doc: &XmlDocument) -> Vec<String> {
    let root = doc.root();
    let Some((offset, count, _)) = worksheet_titles(root) else {
        return Vec::new();
    };
    vector(root, "TitlesOfParts")
        .map(|titles| {
            titles
                .elements()
                .skip(offset)
                .take(count)
                .map(XmlElement::text)
                .collect()
        })
        .unwrap_or_default()
}
