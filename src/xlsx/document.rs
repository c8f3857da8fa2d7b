//! The spreadsheet document: package lifecycle, integrity and dispatch.
//!
//! A [`Document`] moves through three states. It starts `Uninitialized`,
//! becomes `Open` after [`Document::open`] or [`Document::create`], and
//! `Closed` after [`Document::close`]. Everything except opening and creating
//! requires the `Open` state.
//!
//! While open, the document owns the part store, the content-type registry and
//! the two relationship tables it manages directly (package root and
//! workbook). Those three bookkeeping parts are held in structured form and
//! written out in full on every save; all other parts are written only when
//! they were changed.
//!
//! # Example
//!
//! ```no_run
//! use longan::xlsx::{Command, Document, Query};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut doc = Document::new();
//! doc.create("report.xlsx")?;
//! doc.execute_command(Command::AddWorksheet { name: "Data".into() })?;
//! assert_eq!(doc.execute_query(&Query::SheetCount)?, "2");
//! doc.save()?;
//! # Ok(())
//! # }
//! ```

use crate::common::xml::{XmlDocument, XmlElement};
use crate::opc::archive::{ArchiveError, ZipArchiveStore};
use crate::opc::constants::{content_type as ct, namespace, relationship_type as rt};
use crate::opc::content_types::ContentTypeRegistry;
use crate::opc::error::OpcError;
use crate::opc::options::PackageOptions;
use crate::opc::packuri::PackURI;
use crate::opc::part::XmlPartRef;
use crate::opc::rel::{Relationship, RelationshipSet};
use crate::opc::store::PartStore;
use crate::xlsx::command::{Command, PartOwner, Query, bool_answer, number_answer};
use crate::xlsx::error::{Result, XlsxError};
use crate::xlsx::properties::{self, Property, PropertyPart};
use crate::xlsx::templates;
use crate::xlsx::workbook::{SheetEntry, SheetState, Workbook, validate_sheet_name};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WORKBOOK_PARTNAME: &str = "/xl/workbook.xml";
const FIRST_SHEET_PARTNAME: &str = "/xl/worksheets/sheet1.xml";
const STYLES_PARTNAME: &str = "/xl/styles.xml";
const CORE_PROPS_PARTNAME: &str = "/docProps/core.xml";
const APP_PROPS_PARTNAME: &str = "/docProps/app.xml";

/// Lifecycle state of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Uninitialized,
    Open,
    Closed,
}

impl DocumentState {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentState::Uninitialized => "uninitialized",
            DocumentState::Open => "open",
            DocumentState::Closed => "closed",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrow interface through which object-model code reaches the package.
///
/// Implemented by [`Document`]; worksheet, style or shared-string layers take
/// `&dyn PackageAccess` (or `&mut dyn PackageAccess`) instead of depending on
/// the document type.
pub trait PackageAccess {
    /// Shared handle to an existing part.
    fn xml_part(&self, partname: &PackURI) -> Result<XmlPartRef>;

    /// Handle to `partname`, creating it from the built-in template for
    /// `content_type` and linking it with `relationship_type` when missing.
    fn get_or_create_xml_part(
        &mut self,
        partname: &PackURI,
        content_type: &str,
        relationship_type: &str,
    ) -> Result<XmlPartRef>;

    /// Relationships of `reltype` in the table of `owner`, in declaration
    /// order.
    fn relationships_of_type(&self, owner: PartOwner, reltype: &str) -> Result<Vec<Relationship>>;

    fn content_type_of(&self, partname: &PackURI) -> Result<String>;

    fn execute_command(&mut self, command: Command) -> Result<()>;

    fn execute_query(&self, query: &Query) -> Result<String>;
}

/// Map a package error raised while loading bookkeeping to an integrity
/// error. Archive failures pass through unchanged.
fn integrity(context: &str) -> impl FnOnce(OpcError) -> XlsxError + '_ {
    move |err| match err {
        OpcError::Archive(e) => XlsxError::Opc(OpcError::Archive(e)),
        other => XlsxError::PackageIntegrity(format!("{}: {}", context, other)),
    }
}

/// State of an open document.
struct OpenPackage {
    path: PathBuf,
    store: PartStore,
    content_types: ContentTypeRegistry,
    package_rels: RelationshipSet,
    workbook_rels: RelationshipSet,
    workbook: Workbook,
}

impl OpenPackage {
    fn load(path: &Path, options: &PackageOptions) -> Result<Self> {
        let archive = ZipArchiveStore::open(path, options).map_err(|e| match e {
            ArchiveError::Zip(err) => XlsxError::ArchiveCorrupt(format!("{}: {}", path.display(), err)),
            other => XlsxError::Opc(OpcError::Archive(other)),
        })?;
        let store = PartStore::new(Box::new(archive));

        let content_types = store
            .load_document(&PackURI::content_types())
            .and_then(|doc| ContentTypeRegistry::from_xml(&doc))
            .map_err(integrity("content types"))?;

        let package = PackURI::package();
        let package_rels = store
            .load_document(&package.rels_uri())
            .and_then(|doc| RelationshipSet::from_xml(package.clone(), &doc))
            .map_err(integrity("package relationships"))?;

        let workbook_path = package_rels
            .targets_of_type(rt::OFFICE_DOCUMENT)
            .next()
            .ok_or_else(|| {
                XlsxError::PackageIntegrity("no officeDocument relationship in _rels/.rels".to_string())
            })
            .and_then(|rel| {
                package_rels
                    .target_partname(rel)
                    .map_err(integrity("officeDocument relationship"))
            })?;
        if !store.exists(&workbook_path) {
            return Err(XlsxError::PackageIntegrity(format!(
                "workbook part {} is missing",
                workbook_path
            )));
        }

        let workbook_rels = match store.load_document(&workbook_path.rels_uri()) {
            Ok(doc) => RelationshipSet::from_xml(workbook_path.clone(), &doc)
                .map_err(integrity("workbook relationships"))?,
            Err(OpcError::PartNotFound(_)) => {
                warn!(workbook = %workbook_path, "workbook has no relationships part");
                RelationshipSet::new(workbook_path.clone())
            },
            Err(err) => return Err(integrity("workbook relationships")(err)),
        };

        let workbook = Workbook::new(store.get(&workbook_path).map_err(integrity("workbook"))?);

        Ok(Self {
            path: path.to_path_buf(),
            store,
            content_types,
            package_rels,
            workbook_rels,
            workbook,
        })
    }

    fn create(path: &Path) -> Result<Self> {
        let mut store = PartStore::new(Box::new(ZipArchiveStore::new()));
        let workbook_path = PackURI::new(WORKBOOK_PARTNAME)?;
        let sheet_path = PackURI::new(FIRST_SHEET_PARTNAME)?;
        let styles_path = PackURI::new(STYLES_PARTNAME)?;
        let core_path = PackURI::new(CORE_PROPS_PARTNAME)?;
        let app_path = PackURI::new(APP_PROPS_PARTNAME)?;

        let mut core = templates::parse(templates::CORE_PROPS_XML)?;
        let now = properties::w3cdtf_now();
        properties::write(&mut core, Property::CreationDate, &now);
        properties::write(&mut core, Property::ModificationDate, &now);

        let mut content_types = ContentTypeRegistry::new();
        content_types.add_default("rels", ct::OPC_RELATIONSHIPS);
        content_types.add_default("xml", ct::XML);

        let parts = [
            (&workbook_path, ct::SML_SHEET_MAIN, templates::parse(templates::WORKBOOK_XML)?),
            (&sheet_path, ct::SML_WORKSHEET, templates::parse(templates::WORKSHEET_XML)?),
            (&styles_path, ct::SML_STYLES, templates::parse(templates::STYLES_XML)?),
            (&core_path, ct::OPC_CORE_PROPERTIES, core),
            (&app_path, ct::OFC_EXTENDED_PROPERTIES, templates::parse(templates::APP_PROPS_XML)?),
        ];
        for (partname, content_type, document) in parts {
            store.create(partname, document)?;
            content_types.ensure_type(partname, content_type);
        }

        let mut package_rels = RelationshipSet::new(PackURI::package());
        package_rels.add_part(rt::OFFICE_DOCUMENT, &workbook_path)?;
        package_rels.add_part(rt::CORE_PROPERTIES, &core_path)?;
        package_rels.add_part(rt::EXTENDED_PROPERTIES, &app_path)?;

        // The workbook template refers to its only sheet as rId1.
        let mut workbook_rels = RelationshipSet::new(workbook_path.clone());
        workbook_rels.add_part(rt::WORKSHEET, &sheet_path)?;
        workbook_rels.add_part(rt::STYLES, &styles_path)?;

        let workbook = Workbook::new(store.get(&workbook_path)?);

        Ok(Self {
            path: path.to_path_buf(),
            store,
            content_types,
            package_rels,
            workbook_rels,
            workbook,
        })
    }

    fn workbook_path(&self) -> &PackURI {
        self.workbook_rels.source()
    }

    fn rels(&self, owner: PartOwner) -> &RelationshipSet {
        match owner {
            PartOwner::Package => &self.package_rels,
            PartOwner::Workbook => &self.workbook_rels,
        }
    }

    fn rels_mut(&mut self, owner: PartOwner) -> &mut RelationshipSet {
        match owner {
            PartOwner::Package => &mut self.package_rels,
            PartOwner::Workbook => &mut self.workbook_rels,
        }
    }

    /// Parts kept in structured form and regenerated on save.
    fn is_bookkeeping(&self, partname: &PackURI) -> bool {
        *partname == PackURI::content_types()
            || *partname == self.package_rels.source().rels_uri()
            || *partname == self.workbook_rels.source().rels_uri()
    }

    fn reject_bookkeeping(&self, partname: &PackURI) -> Result<()> {
        if self.is_bookkeeping(partname) {
            return Err(XlsxError::PackageIntegrity(format!(
                "{} is maintained by the package and cannot be accessed as a part",
                partname
            )));
        }
        Ok(())
    }

    fn part_exists(&self, partname: &PackURI) -> bool {
        self.is_bookkeeping(partname) || self.store.exists(partname)
    }

    // ---- parts ----

    fn get_or_create_part(
        &mut self,
        partname: &PackURI,
        content_type: &str,
        relationship_type: &str,
    ) -> Result<XmlPartRef> {
        self.reject_bookkeeping(partname)?;
        if self.store.exists(partname) {
            return Ok(self.store.get(partname)?);
        }

        let document = templates::for_content_type(content_type)?;
        let owner = if rt::is_package_level(relationship_type) {
            PartOwner::Package
        } else {
            PartOwner::Workbook
        };
        let rels = self.rels_mut(owner);
        if rels.find_by_target(partname).is_empty() {
            rels.add_part(relationship_type, partname)?;
        }
        let handle = self.store.create(partname, document)?;
        self.content_types.ensure_type(partname, content_type);
        debug!(partname = %partname, content_type, "created part from template");
        Ok(handle)
    }

    // ---- properties ----

    fn property_partname(&self, part: PropertyPart) -> Option<PackURI> {
        let reltype = match part {
            PropertyPart::Core => rt::CORE_PROPERTIES,
            PropertyPart::App => rt::EXTENDED_PROPERTIES,
        };
        self.package_rels
            .targets_of_type(reltype)
            .find_map(|rel| self.package_rels.target_partname(rel).ok())
    }

    /// Handle to an existing property part.
    fn property_part(&self, part: PropertyPart) -> Result<Option<XmlPartRef>> {
        match self.property_partname(part) {
            Some(partname) if self.store.exists(&partname) => Ok(Some(self.store.get(&partname)?)),
            _ => Ok(None),
        }
    }

    fn property(&self, prop: Property) -> Result<String> {
        let Some(part) = self.property_part(prop.part())? else {
            return Ok(String::new());
        };
        let mut part = part.borrow_mut();
        Ok(properties::read(part.document()?, prop))
    }

    fn set_property(&mut self, prop: Property, value: &str) -> Result<()> {
        let (default_partname, content_type, reltype) = match prop.part() {
            PropertyPart::Core => (CORE_PROPS_PARTNAME, ct::OPC_CORE_PROPERTIES, rt::CORE_PROPERTIES),
            PropertyPart::App => (APP_PROPS_PARTNAME, ct::OFC_EXTENDED_PROPERTIES, rt::EXTENDED_PROPERTIES),
        };
        let partname = match self.property_partname(prop.part()) {
            Some(partname) => partname,
            None => PackURI::new(default_partname)?,
        };
        let part = self.get_or_create_part(&partname, content_type, reltype)?;
        properties::write(part.borrow_mut().document_mut()?, prop, value);
        Ok(())
    }

    fn delete_property(&mut self, prop: Property) -> Result<()> {
        let Some(part) = self.property_part(prop.part())? else {
            return Ok(());
        };
        let mut part = part.borrow_mut();
        if properties::contains(part.document()?, prop) {
            properties::remove(part.document_mut()?, prop);
        }
        Ok(())
    }

    // ---- integrity and save ----

    /// Every internal relationship target must exist and every part must
    /// resolve a content type.
    fn check_integrity(&self) -> Result<()> {
        for rels in [&self.package_rels, &self.workbook_rels] {
            for rel in rels.iter().filter(|r| !r.is_external()) {
                let target = rels
                    .target_partname(rel)
                    .map_err(integrity("relationship target"))?;
                if !self.store.exists(&target) {
                    return Err(XlsxError::PackageIntegrity(format!(
                        "relationship {} of {} targets missing part {}",
                        rel.r_id(),
                        rels.source(),
                        target
                    )));
                }
            }
        }

        let content_types_uri = PackURI::content_types();
        for partname in self.store.entry_names() {
            if partname == content_types_uri {
                continue;
            }
            self.content_types
                .type_of(&partname)
                .map_err(integrity("content type"))?;
        }
        Ok(())
    }

    fn save_to(&mut self, dest: &Path, options: &PackageOptions) -> Result<()> {
        let package_rels_uri = self.package_rels.source().rels_uri();
        let workbook_rels_uri = self.workbook_rels.source().rels_uri();
        self.content_types
            .ensure_type(&package_rels_uri, ct::OPC_RELATIONSHIPS);
        self.content_types
            .ensure_type(&workbook_rels_uri, ct::OPC_RELATIONSHIPS);

        self.check_integrity()?;

        let written = self.store.commit()?;
        let bookkeeping = [
            (PackURI::content_types(), self.content_types.to_xml()),
            (package_rels_uri, self.package_rels.to_xml()),
            (workbook_rels_uri, self.workbook_rels.to_xml()),
        ];
        for (partname, document) in bookkeeping {
            self.store.write_raw(&partname, document.to_bytes()?)?;
        }

        self.store
            .persist(dest, options)
            .map_err(|source| XlsxError::IoWrite {
                path: dest.display().to_string(),
                source,
            })?;
        debug!(path = %dest.display(), parts_written = written, "saved document");
        Ok(())
    }

    // ---- commands ----

    fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::AddWorksheet { name } => self.add_worksheet(&name),
            Command::DeleteWorksheet { name } => self.delete_worksheet(&name),
            Command::RenameWorksheet { old_name, new_name } => {
                self.rename_worksheet(&old_name, &new_name)
            },
            Command::CloneWorksheet { source, name } => self.clone_worksheet(&source, &name),
            Command::MoveWorksheet { name, index } => self.move_worksheet(&name, index),
            Command::AddPart {
                partname,
                content_type,
                relationship_type,
                owner,
                content,
            } => self.add_part(&partname, &content_type, &relationship_type, owner, &content),
            Command::DeletePart { partname } => self.delete_part(&partname),
        }
    }

    /// Reject invalid or already used sheet names. `current` is the name
    /// being replaced, which may be reused with different casing.
    fn check_new_sheet_name(&self, name: &str, current: Option<&str>) -> Result<()> {
        validate_sheet_name(name)?;
        let recasing = current.is_some_and(|c| c.to_lowercase() == name.to_lowercase());
        if !recasing && self.workbook.sheet_exists(name)? {
            return Err(XlsxError::SheetNameCollision(name.to_string()));
        }
        Ok(())
    }

    /// Register a new worksheet part holding `document` and insert it into
    /// the sheet list.
    fn insert_worksheet(&mut self, name: &str, index: Option<usize>, document: XmlDocument) -> Result<()> {
        let template = format!("{}/worksheets/sheet%d.xml", self.workbook_path().base_uri());
        let partname = self.store.next_partname(&template)?;
        let sheet_id = self.workbook.next_sheet_id()?;
        let sheet_count = self.workbook.sheet_count()?;
        let app = self.property_part(PropertyPart::App)?;
        if let Some(app) = &app {
            app.borrow_mut().materialize()?;
        }

        let rel_id = self.workbook_rels.add_part(rt::WORKSHEET, &partname)?;
        self.store.create(&partname, document)?;
        self.content_types.ensure_type(&partname, ct::SML_WORKSHEET);
        let entry = SheetEntry {
            name: name.to_string(),
            sheet_id,
            rel_id,
            state: SheetState::Visible,
        };
        self.workbook.insert_sheet(index, &entry)?;
        if let Some(app) = app {
            properties::insert_sheet_title(
                app.borrow_mut().document_mut()?,
                index.unwrap_or(sheet_count),
                name,
            );
        }
        debug!(sheet = name, partname = %partname, "inserted worksheet");
        Ok(())
    }

    fn add_worksheet(&mut self, name: &str) -> Result<()> {
        self.check_new_sheet_name(name, None)?;
        let document = templates::for_content_type(ct::SML_WORKSHEET)?;
        self.insert_worksheet(name, None, document)
    }

    fn delete_worksheet(&mut self, name: &str) -> Result<()> {
        let (index, entry) = self.workbook.require(name)?;
        if self.workbook.sheet_count()? <= 1 {
            return Err(XlsxError::LastSheet(entry.name));
        }
        let sheet_path = self.workbook_rels.resolve(&entry.rel_id)?;
        let calc_chains: Vec<(String, PackURI)> = self
            .workbook_rels
            .targets_of_type(rt::CALC_CHAIN)
            .filter_map(|rel| {
                let target = self.workbook_rels.target_partname(rel).ok()?;
                Some((rel.r_id().to_string(), target))
            })
            .collect();
        let app = self.property_part(PropertyPart::App)?;
        if let Some(app) = &app {
            app.borrow_mut().materialize()?;
        }

        self.workbook.remove_sheet(index)?;
        self.workbook_rels.remove(&entry.rel_id)?;
        self.remove_part_entries(&sheet_path);

        // Excel rebuilds the calculation chain; a stale one makes the file
        // unreadable.
        for (r_id, partname) in calc_chains {
            self.workbook_rels.remove(&r_id)?;
            self.remove_part_entries(&partname);
        }

        if let Some(app) = app {
            properties::remove_sheet_title(app.borrow_mut().document_mut()?, &entry.name);
        }
        debug!(sheet = %entry.name, partname = %sheet_path, "deleted worksheet");
        Ok(())
    }

    /// Drop a part, its own relationships part and its content-type override.
    fn remove_part_entries(&mut self, partname: &PackURI) {
        let rels_uri = partname.rels_uri();
        self.store.remove(partname);
        self.store.remove(&rels_uri);
        self.content_types.remove(partname);
        self.content_types.remove(&rels_uri);
    }

    fn rename_worksheet(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let (index, entry) = self.workbook.require(old_name)?;
        self.check_new_sheet_name(new_name, Some(entry.name.as_str()))?;
        let app = self.property_part(PropertyPart::App)?;
        if let Some(app) = &app {
            app.borrow_mut().materialize()?;
        }

        self.workbook.rename_sheet(index, new_name)?;
        if let Some(app) = app {
            properties::rename_sheet_title(app.borrow_mut().document_mut()?, &entry.name, new_name);
        }
        debug!(from = %entry.name, to = new_name, "renamed worksheet");
        Ok(())
    }

    fn clone_worksheet(&mut self, source: &str, name: &str) -> Result<()> {
        let (index, entry) = self.workbook.require(source)?;
        self.check_new_sheet_name(name, None)?;
        let source_path = self.workbook_rels.resolve(&entry.rel_id)?;
        let mut document = self.store.get(&source_path)?.borrow_mut().document()?.clone();
        prepare_cloned_sheet(&mut document);
        self.insert_worksheet(name, Some(index + 1), document)
    }

    fn move_worksheet(&mut self, name: &str, index: usize) -> Result<()> {
        let (from, _) = self.workbook.require(name)?;
        let to = index.min(self.workbook.sheet_count()?.saturating_sub(1));
        if from == to {
            return Ok(());
        }
        let app = self.property_part(PropertyPart::App)?;
        if let Some(app) = &app {
            app.borrow_mut().materialize()?;
        }

        self.workbook.move_sheet(from, to)?;
        if let Some(app) = app {
            properties::move_sheet_title(app.borrow_mut().document_mut()?, from, to);
        }
        Ok(())
    }

    fn add_part(
        &mut self,
        partname: &PackURI,
        content_type: &str,
        relationship_type: &str,
        owner: PartOwner,
        content: &[u8],
    ) -> Result<()> {
        self.reject_bookkeeping(partname)?;
        if self.store.exists(partname) {
            return Err(OpcError::DuplicatePart(partname.to_string()).into());
        }
        let document = XmlDocument::parse(content).map_err(|source| OpcError::MalformedXml {
            partname: partname.to_string(),
            source,
        })?;

        let r_id = self.rels_mut(owner).add_part(relationship_type, partname)?;
        self.store.create(partname, document)?;
        self.content_types.ensure_type(partname, content_type);
        debug!(partname = %partname, r_id = %r_id, "added part");
        Ok(())
    }

    fn delete_part(&mut self, partname: &PackURI) -> Result<()> {
        self.reject_bookkeeping(partname)?;
        if partname == self.workbook_path() {
            return Err(XlsxError::PackageIntegrity(
                "the workbook part cannot be deleted".to_string(),
            ));
        }
        if !self.store.exists(partname) {
            return Err(OpcError::PartNotFound(partname.to_string()).into());
        }

        // A worksheet part goes through the sheet cascade.
        let sheet = self
            .workbook_rels
            .find_by_target(partname)
            .into_iter()
            .find(|rel| rel.reltype() == rt::WORKSHEET)
            .map(|rel| rel.r_id().to_string());
        if let Some(r_id) = sheet {
            let name = self
                .workbook
                .sheets()?
                .into_iter()
                .find(|s| s.rel_id == r_id)
                .map(|s| s.name);
            if let Some(name) = name {
                return self.delete_worksheet(&name);
            }
        }

        for owner in [PartOwner::Package, PartOwner::Workbook] {
            let ids: Vec<String> = self
                .rels(owner)
                .find_by_target(partname)
                .into_iter()
                .map(|rel| rel.r_id().to_string())
                .collect();
            for r_id in ids {
                self.rels_mut(owner).remove(&r_id)?;
            }
        }
        self.remove_part_entries(partname);
        debug!(partname = %partname, "deleted part");
        Ok(())
    }

    // ---- queries ----

    fn query(&self, query: &Query) -> Result<String> {
        match query {
            Query::SheetExists { name } => Ok(bool_answer(self.workbook.sheet_exists(name)?)),
            Query::SheetCount => Ok(number_answer(self.workbook.sheet_count()?)),
            Query::SheetIndex { name } => Ok(number_answer(self.workbook.require(name)?.0)),
            Query::SheetPath { name } => {
                let (_, entry) = self.workbook.require(name)?;
                Ok(self.workbook_rels.resolve(&entry.rel_id)?.to_string())
            },
            Query::SheetId { name } => Ok(number_answer(self.workbook.require(name)?.1.sheet_id)),
            Query::ContentType { partname } => Ok(self.content_types.type_of(partname)?.to_string()),
            Query::PartExists { partname } => Ok(bool_answer(self.part_exists(partname))),
            Query::RelationshipTarget { owner, id } => {
                Ok(self.rels(*owner).find(id)?.target_ref().to_string())
            },
            Query::Property { property } => self.property(*property),
        }
    }
}

/// Strip what a copied worksheet cannot share with its source: elements
/// referring to the source's relationships, and tab selection.
fn prepare_cloned_sheet(document: &mut XmlDocument) {
    let root = document.root_mut();
    if let Some(prefix) = root
        .namespace_prefix(namespace::OFC_RELATIONSHIPS)
        .filter(|p| !p.is_empty())
    {
        let marker = format!("{}:", prefix);
        root.retain_elements(|e| !references_relationship(e, &marker));
    }
    if let Some(views) = root.child_mut("sheetViews") {
        for view in views.elements_mut() {
            view.remove_attribute("tabSelected");
        }
    }
}

fn references_relationship(element: &XmlElement, marker: &str) -> bool {
    element.attributes().any(|(k, _)| k.starts_with(marker))
        || element.elements().any(|child| references_relationship(child, marker))
}

/// A spreadsheet document.
pub struct Document {
    state: DocumentState,
    options: PackageOptions,
    inner: Option<OpenPackage>,
}

impl Document {
    pub fn new() -> Self {
        Self::with_options(PackageOptions::default())
    }

    pub fn with_options(options: PackageOptions) -> Self {
        Self {
            state: DocumentState::Uninitialized,
            options,
            inner: None,
        }
    }

    #[inline]
    pub fn state(&self) -> DocumentState {
        self.state
    }

    #[inline]
    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    fn invalid_state(&self, operation: &'static str) -> XlsxError {
        XlsxError::InvalidState {
            operation,
            state: self.state.as_str(),
        }
    }

    fn inner(&self, operation: &'static str) -> Result<&OpenPackage> {
        match &self.inner {
            Some(inner) if self.state == DocumentState::Open => Ok(inner),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn inner_mut(&mut self, operation: &'static str) -> Result<&mut OpenPackage> {
        if self.state != DocumentState::Open {
            return Err(self.invalid_state(operation));
        }
        let state = self.state.as_str();
        self.inner
            .as_mut()
            .ok_or(XlsxError::InvalidState { operation, state })
    }

    /// Open the spreadsheet at `path`.
    ///
    /// On failure the document keeps its previous state.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.state == DocumentState::Open {
            return Err(self.invalid_state("open"));
        }
        let path = path.as_ref();
        let inner = OpenPackage::load(path, &self.options)?;
        debug!(
            path = %path.display(),
            workbook = %inner.workbook_path(),
            "opened document"
        );
        self.inner = Some(inner);
        self.state = DocumentState::Open;
        Ok(())
    }

    /// Create a new workbook with a single empty sheet named `Sheet1`.
    ///
    /// Nothing is written to `path` until [`save`](Self::save).
    pub fn create<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.state == DocumentState::Open {
            return Err(self.invalid_state("create"));
        }
        let path = path.as_ref();
        let inner = OpenPackage::create(path)?;
        debug!(path = %path.display(), "created document");
        self.inner = Some(inner);
        self.state = DocumentState::Open;
        Ok(())
    }

    /// Write the document to its current path.
    pub fn save(&mut self) -> Result<()> {
        let options = self.options.clone();
        let inner = self.inner_mut("save")?;
        let path = inner.path.clone();
        inner.save_to(&path, &options)
    }

    /// Write the document to `path`, which becomes its current path.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let options = self.options.clone();
        let inner = self.inner_mut("save")?;
        let path = path.as_ref();
        inner.save_to(path, &options)?;
        inner.path = path.to_path_buf();
        Ok(())
    }

    /// Release the archive and every cached part.
    pub fn close(&mut self) -> Result<()> {
        let inner = self.inner_mut("close")?;
        debug!(path = %inner.path.display(), "closed document");
        self.inner = None;
        self.state = DocumentState::Closed;
        Ok(())
    }

    /// File name of the document, e.g. `report.xlsx`.
    pub fn name(&self) -> Result<&str> {
        let inner = self.inner("get the name")?;
        Ok(inner
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default())
    }

    pub fn path(&self) -> Result<&Path> {
        Ok(&self.inner("get the path")?.path)
    }

    /// The workbook's sheet list.
    pub fn workbook(&self) -> Result<&Workbook> {
        Ok(&self.inner("access the workbook")?.workbook)
    }

    /// Value of a document property; empty when it is not set.
    pub fn property(&self, prop: Property) -> Result<String> {
        self.inner("read a property")?.property(prop)
    }

    /// Set a document property, creating the property part when needed.
    pub fn set_property(&mut self, prop: Property, value: &str) -> Result<()> {
        self.inner_mut("set a property")?.set_property(prop, value)
    }

    pub fn delete_property(&mut self, prop: Property) -> Result<()> {
        self.inner_mut("delete a property")?.delete_property(prop)
    }

    /// Run a command. Preconditions are checked before anything changes, so
    /// a failed command leaves the document as it was.
    pub fn execute_command(&mut self, command: Command) -> Result<()> {
        let inner = self.inner_mut("execute a command")?;
        debug!(command = command.name(), "executing command");
        inner.execute(command)
    }

    /// Answer a read-only query.
    pub fn execute_query(&self, query: &Query) -> Result<String> {
        self.inner("execute a query")?.query(query)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Document");
        s.field("state", &self.state);
        if let Some(inner) = &self.inner {
            s.field("path", &inner.path).field("store", &inner.store);
        }
        s.finish()
    }
}

impl PackageAccess for Document {
    fn xml_part(&self, partname: &PackURI) -> Result<XmlPartRef> {
        let inner = self.inner("access a part")?;
        inner.reject_bookkeeping(partname)?;
        Ok(inner.store.get(partname)?)
    }

    fn get_or_create_xml_part(
        &mut self,
        partname: &PackURI,
        content_type: &str,
        relationship_type: &str,
    ) -> Result<XmlPartRef> {
        self.inner_mut("create a part")?
            .get_or_create_part(partname, content_type, relationship_type)
    }

    fn relationships_of_type(&self, owner: PartOwner, reltype: &str) -> Result<Vec<Relationship>> {
        Ok(self
            .inner("read relationships")?
            .rels(owner)
            .targets_of_type(reltype)
            .cloned()
            .collect())
    }

    fn content_type_of(&self, partname: &PackURI) -> Result<String> {
        Ok(self
            .inner("read a content type")?
            .content_types
            .type_of(partname)?
            .to_string())
    }

    fn execute_command(&mut self, command: Command) -> Result<()> {
        Document::execute_command(self, command)
    }

    fn execute_query(&self, query: &Query) -> Result<String> {
        Document::execute_query(self, query)
    }
}
