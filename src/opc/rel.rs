//! Relationship tables.
//!
//! Every part (and the package itself) may own a `.rels` part listing typed
//! references to other parts or to external resources. A [`RelationshipSet`]
//! is the in-memory form of one such table.

use crate::common::xml::{XmlDocument, XmlElement};
use crate::opc::constants::{namespace, target_mode};
use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::PackURI;

/// Whether a relationship points inside the package or outside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetMode {
    #[default]
    Internal,
    External,
}

impl TargetMode {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            TargetMode::Internal => target_mode::INTERNAL,
            TargetMode::External => target_mode::EXTERNAL,
        }
    }
}

/// A single relationship from a source part to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    r_id: String,
    reltype: String,
    target_ref: String,
    target_mode: TargetMode,
}

impl Relationship {
    pub fn new(r_id: String, reltype: String, target_ref: String, target_mode: TargetMode) -> Self {
        Self {
            r_id,
            reltype,
            target_ref,
            target_mode,
        }
    }

    #[inline]
    pub fn r_id(&self) -> &str {
        &self.r_id
    }

    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    /// Target exactly as stored: a relative or absolute part reference, or an
    /// external URL.
    #[inline]
    pub fn target_ref(&self) -> &str {
        &self.target_ref
    }

    #[inline]
    pub fn target_mode(&self) -> TargetMode {
        self.target_mode
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.target_mode == TargetMode::External
    }
}

/// Relationships owned by one source part, in declaration order.
///
/// Ids are allocated from a counter seeded past the largest `rId<N>` ever
/// seen, so an id is never handed out twice, even after the relationship
/// holding it has been removed.
#[derive(Debug, Clone)]
pub struct RelationshipSet {
    /// Partname of the owning part (`/` for the package).
    source: PackURI,
    rels: Vec<Relationship>,
    next_id: u32,
}

impl RelationshipSet {
    /// An empty set owned by `source`.
    pub fn new(source: PackURI) -> Self {
        Self {
            source,
            rels: Vec::new(),
            next_id: 1,
        }
    }

    /// Parse a `.rels` part owned by `source`.
    pub fn from_xml(source: PackURI, doc: &XmlDocument) -> Result<Self> {
        let root = doc.root();
        if root.local_name() != "Relationships" {
            return Err(OpcError::InvalidRelationship(format!(
                "expected <Relationships> in {}, found <{}>",
                source.rels_uri(),
                root.name()
            )));
        }

        let mut set = Self::new(source);
        for element in root.elements().filter(|e| e.local_name() == "Relationship") {
            let (Some(r_id), Some(reltype), Some(target)) = (
                element.attribute("Id"),
                element.attribute("Type"),
                element.attribute("Target"),
            ) else {
                return Err(OpcError::InvalidRelationship(format!(
                    "relationship in {} is missing Id, Type or Target",
                    set.source.rels_uri()
                )));
            };
            if set.find(r_id).is_ok() {
                return Err(OpcError::InvalidRelationship(format!(
                    "duplicate relationship id {} in {}",
                    r_id,
                    set.source.rels_uri()
                )));
            }
            let mode = match element.attribute("TargetMode") {
                Some(m) if m.eq_ignore_ascii_case(target_mode::EXTERNAL) => TargetMode::External,
                _ => TargetMode::Internal,
            };
            set.insert(Relationship::new(
                r_id.to_string(),
                reltype.to_string(),
                target.to_string(),
                mode,
            ));
        }
        Ok(set)
    }

    /// Build the `.rels` document for this set, in declaration order.
    pub fn to_xml(&self) -> XmlDocument {
        let mut root = XmlElement::new("Relationships")
            .with_attribute("xmlns", namespace::OPC_RELATIONSHIPS);
        for rel in &self.rels {
            let mut element = XmlElement::new("Relationship")
                .with_attribute("Id", rel.r_id())
                .with_attribute("Type", rel.reltype())
                .with_attribute("Target", rel.target_ref());
            if rel.is_external() {
                element.set_attribute("TargetMode", TargetMode::External.as_str());
            }
            root.append(element);
        }
        XmlDocument::new(root)
    }

    /// Partname of the owning part.
    #[inline]
    pub fn source(&self) -> &PackURI {
        &self.source
    }

    /// Insert a relationship with a caller-chosen id, bumping the counter
    /// past it.
    fn insert(&mut self, rel: Relationship) {
        if let Some(n) = parse_r_id(rel.r_id()) {
            self.next_id = self.next_id.max(n.saturating_add(1));
        }
        self.rels.push(rel);
    }

    /// Add a relationship and return its newly allocated id.
    ///
    /// Fails with `InvalidRelationship` once the id counter is exhausted.
    pub fn add(&mut self, reltype: &str, target_ref: &str, mode: TargetMode) -> Result<String> {
        let r_id = self.allocate_id()?;
        self.rels.push(Relationship::new(
            r_id.clone(),
            reltype.to_string(),
            target_ref.to_string(),
            mode,
        ));
        Ok(r_id)
    }

    /// Add an internal relationship to `target`, expressed relative to this
    /// set's source.
    pub fn add_part(&mut self, reltype: &str, target: &PackURI) -> Result<String> {
        let target_ref = target.relative_ref(self.source.base_uri());
        self.add(reltype, &target_ref, TargetMode::Internal)
    }

    fn allocate_id(&mut self) -> Result<String> {
        let mut buf = itoa::Buffer::new();
        loop {
            let n = self.next_id;
            self.next_id = n.checked_add(1).ok_or_else(|| {
                OpcError::InvalidRelationship(format!("relationship ids exhausted in {}", self.source))
            })?;

            let digits = buf.format(n);
            let mut candidate = String::with_capacity(3 + digits.len());
            candidate.push_str("rId");
            candidate.push_str(digits);
            if self.rels.iter().all(|r| r.r_id() != candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Look up a relationship by id.
    pub fn find(&self, r_id: &str) -> Result<&Relationship> {
        self.rels
            .iter()
            .find(|r| r.r_id() == r_id)
            .ok_or_else(|| OpcError::RelationshipNotFound(format!("{} in {}", r_id, self.source)))
    }

    /// Resolve an internal relationship's target to an absolute partname.
    pub fn resolve(&self, r_id: &str) -> Result<PackURI> {
        let rel = self.find(r_id)?;
        self.target_partname(rel)
    }

    /// Absolute partname of an internal relationship's target.
    pub fn target_partname(&self, rel: &Relationship) -> Result<PackURI> {
        if rel.is_external() {
            return Err(OpcError::InvalidRelationship(format!(
                "{} is an external relationship",
                rel.r_id()
            )));
        }
        PackURI::from_rel_ref(self.source.base_uri(), rel.target_ref())
    }

    /// Remove a relationship. The target part is left alone.
    pub fn remove(&mut self, r_id: &str) -> Result<Relationship> {
        let pos = self
            .rels
            .iter()
            .position(|r| r.r_id() == r_id)
            .ok_or_else(|| OpcError::RelationshipNotFound(format!("{} in {}", r_id, self.source)))?;
        Ok(self.rels.remove(pos))
    }

    /// Relationships of `reltype`, in declaration order.
    pub fn targets_of_type<'a, 't>(
        &'a self,
        reltype: &'t str,
    ) -> impl Iterator<Item = &'a Relationship> + use<'a, 't> {
        self.rels.iter().filter(move |r| r.reltype() == reltype)
    }

    /// The single relationship of `reltype`, if exactly one exists.
    pub fn single_of_type(&self, reltype: &str) -> Result<&Relationship> {
        let mut matching = self.targets_of_type(reltype);
        match (matching.next(), matching.next()) {
            (Some(rel), None) => Ok(rel),
            (None, _) => Err(OpcError::RelationshipNotFound(format!(
                "no relationship of type '{}' in {}",
                reltype, self.source
            ))),
            (Some(_), Some(_)) => Err(OpcError::InvalidRelationship(format!(
                "multiple relationships of type '{}' in {}",
                reltype, self.source
            ))),
        }
    }

    /// Internal relationships whose target resolves to `target`.
    pub fn find_by_target(&self, target: &PackURI) -> Vec<&Relationship> {
        self.rels
            .iter()
            .filter(|r| !r.is_external())
            .filter(|r| self.target_partname(r).is_ok_and(|p| &p == target))
            .collect()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }
}

/// Numeric suffix of an `rId<N>` id.
#[inline]
fn parse_r_id(r_id: &str) -> Option<u32> {
    let digits = r_id.strip_prefix("rId")?;
    atoi_simd::parse::<u32>(digits.as_bytes()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::constants::relationship_type as rt;

    fn workbook_rels() -> RelationshipSet {
        RelationshipSet::new(PackURI::new("/xl/workbook.xml").unwrap())
    }

    #[test]
    fn test_add_and_resolve() {
        let mut rels = workbook_rels();
        let sheet = PackURI::new("/xl/worksheets/sheet1.xml").unwrap();
        let r_id = rels.add_part(rt::WORKSHEET, &sheet).unwrap();
        assert_eq!(r_id, "rId1");
        assert_eq!(rels.find("rId1").unwrap().target_ref(), "worksheets/sheet1.xml");
        assert_eq!(rels.resolve("rId1").unwrap(), sheet);
        assert!(matches!(rels.find("rId9"), Err(OpcError::RelationshipNotFound(_))));
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut rels = workbook_rels();
        let a = rels.add(rt::WORKSHEET, "worksheets/sheet1.xml", TargetMode::Internal).unwrap();
        let b = rels.add(rt::WORKSHEET, "worksheets/sheet2.xml", TargetMode::Internal).unwrap();
        rels.remove(&b).unwrap();
        let c = rels.add(rt::WORKSHEET, "worksheets/sheet3.xml", TargetMode::Internal).unwrap();
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("rId1", "rId2", "rId3"));
        assert!(rels.remove(&b).is_err());
    }

    #[test]
    fn test_from_xml_seeds_counter_past_max() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let mut rels = RelationshipSet::from_xml(workbook_rels().source().clone(), &doc).unwrap();

        assert_eq!(rels.len(), 2);
        assert!(rels.find("rId2").unwrap().is_external());
        assert!(rels.resolve("rId2").is_err());
        assert_eq!(rels.add(rt::STYLES, "styles.xml", TargetMode::Internal).unwrap(), "rId8");
    }

    #[test]
    fn test_targets_of_type_keeps_declaration_order() {
        let mut rels = workbook_rels();
        rels.add(rt::WORKSHEET, "worksheets/sheet2.xml", TargetMode::Internal).unwrap();
        rels.add(rt::STYLES, "styles.xml", TargetMode::Internal).unwrap();
        rels.add(rt::WORKSHEET, "worksheets/sheet1.xml", TargetMode::Internal).unwrap();

        let targets: Vec<_> = rels.targets_of_type(rt::WORKSHEET).map(|r| r.target_ref()).collect();
        assert_eq!(targets, ["worksheets/sheet2.xml", "worksheets/sheet1.xml"]);
        assert!(rels.single_of_type(rt::WORKSHEET).is_err());
        assert!(rels.single_of_type(rt::STYLES).is_ok());
    }

    #[test]
    fn test_xml_round_trip() {
        let mut rels = RelationshipSet::new(PackURI::package());
        rels.add_part(rt::OFFICE_DOCUMENT, &PackURI::new("/xl/workbook.xml").unwrap()).unwrap();
        rels.add(rt::HYPERLINK, "https://example.com/?a=1&b=2", TargetMode::External).unwrap();

        let bytes = rels.to_xml().to_bytes().unwrap();
        let doc = XmlDocument::parse(&bytes).unwrap();
        let again = RelationshipSet::from_xml(PackURI::package(), &doc).unwrap();

        assert_eq!(again.iter().collect::<Vec<_>>(), rels.iter().collect::<Vec<_>>());
        assert_eq!(again.find("rId1").unwrap().target_ref(), "xl/workbook.xml");
    }

    #[test]
    fn test_find_by_target() {
        let mut rels = workbook_rels();
        let sheet = PackURI::new("/xl/worksheets/sheet1.xml").unwrap();
        rels.add_part(rt::WORKSHEET, &sheet).unwrap();
        rels.add(rt::WORKSHEET, "/xl/worksheets/sheet1.xml", TargetMode::Internal).unwrap();
        assert_eq!(rels.find_by_target(&sheet).len(), 2);
    }

    #[test]
    fn test_exhausted_counter_is_an_error() {
        let xml = br#"<Relationships><Relationship Id="rId4294967295" Type="t" Target="a.xml"/></Relationships>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let mut rels = RelationshipSet::from_xml(PackURI::package(), &doc).unwrap();
        assert!(matches!(
            rels.add("t", "b.xml", TargetMode::Internal),
            Err(OpcError::InvalidRelationship(_))
        ));
        assert_eq!(rels.len(), 1);
    }

    #[test]
    fn test_single_of_type_with_owned_reltype() {
        let mut rels = workbook_rels();
        rels.add(rt::STYLES, "styles.xml", TargetMode::Internal).unwrap();
        let reltype = rt::STYLES.to_string();
        let rel = rels.single_of_type(&reltype).unwrap();
        drop(reltype);
        assert_eq!(rel.target_ref(), "styles.xml");
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let xml = br#"<Relationships><Relationship Id="rId1" Type="t" Target="a.xml"/><Relationship Id="rId1" Type="t" Target="b.xml"/></Relationships>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        assert!(RelationshipSet::from_xml(PackURI::package(), &doc).is_err());
    }
}
