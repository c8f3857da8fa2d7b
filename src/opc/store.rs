//! Partname-keyed cache of XML parts over an [`Archive`].
//!
//! Parts are read from the archive the first time they are asked for and
//! cached behind shared handles, so every later lookup of the same partname
//! returns the same underlying part. New parts live only in the cache until
//! [`PartStore::commit`] stages them into the archive.

use crate::common::xml::XmlDocument;
use crate::opc::archive::{Archive, ArchiveError};
use crate::opc::error::{OpcError, Result};
use crate::opc::options::PackageOptions;
use crate::opc::packuri::PackURI;
use crate::opc::part::{XmlPart, XmlPartRef};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

/// Upper bound for [`PartStore::next_partname`].
const MAX_PARTNAME_INDEX: u32 = 10_000;

/// Part cache backed by an archive.
pub struct PartStore {
    archive: RefCell<Box<dyn Archive>>,
    parts: RefCell<HashMap<PackURI, XmlPartRef>>,
    /// Archive entries deleted since the last commit.
    removed: HashSet<PackURI>,
}

impl PartStore {
    pub fn new(archive: Box<dyn Archive>) -> Self {
        Self {
            archive: RefCell::new(archive),
            parts: RefCell::new(HashMap::new()),
            removed: HashSet::new(),
        }
    }

    /// True when the archive holds `partname` and it has not been removed.
    fn in_archive(&self, partname: &PackURI) -> bool {
        !self.removed.contains(partname) && self.archive.borrow().contains(partname.membername())
    }

    fn read_bytes(&self, partname: &PackURI) -> Result<Vec<u8>> {
        if !self.in_archive(partname) {
            return Err(OpcError::PartNotFound(partname.to_string()));
        }
        self.archive
            .borrow_mut()
            .read_entry(partname.membername())
            .map_err(|e| match e {
                ArchiveError::EntryNotFound(_) => OpcError::PartNotFound(partname.to_string()),
                other => OpcError::Archive(other),
            })
    }

    /// Handle to the part at `partname`, loading and caching it on first use.
    ///
    /// A part that fails to parse is reported as `MalformedXml` and is not
    /// cached.
    pub fn get(&self, partname: &PackURI) -> Result<XmlPartRef> {
        if let Some(part) = self.parts.borrow().get(partname) {
            return Ok(Rc::clone(part));
        }

        let bytes = self.read_bytes(partname)?;
        let mut part = XmlPart::from_bytes(partname.clone(), bytes);
        part.materialize()?;
        debug!(partname = %partname, "loaded part");

        let handle = part.into_ref();
        self.parts
            .borrow_mut()
            .insert(partname.clone(), Rc::clone(&handle));
        Ok(handle)
    }

    /// Parse a part without caching it. Used for bookkeeping parts that are
    /// kept in structured form rather than as trees.
    pub fn load_document(&self, partname: &PackURI) -> Result<XmlDocument> {
        let bytes = self.read_bytes(partname)?;
        XmlDocument::parse(&bytes).map_err(|source| OpcError::MalformedXml {
            partname: partname.to_string(),
            source,
        })
    }

    /// Register a new part holding `document`.
    pub fn create(&mut self, partname: &PackURI, document: XmlDocument) -> Result<XmlPartRef> {
        if self.exists(partname) {
            return Err(OpcError::DuplicatePart(partname.to_string()));
        }
        let handle = XmlPart::new(partname.clone(), document).into_ref();
        self.parts
            .get_mut()
            .insert(partname.clone(), Rc::clone(&handle));
        debug!(partname = %partname, "created part");
        Ok(handle)
    }

    /// Evict `partname`. Removing an absent part is a no-op.
    pub fn remove(&mut self, partname: &PackURI) {
        let cached = self.parts.get_mut().remove(partname).is_some();
        let archived = self.archive.get_mut().contains(partname.membername());
        if archived {
            self.removed.insert(partname.clone());
        }
        if cached || archived {
            debug!(partname = %partname, "removed part");
        }
    }

    pub fn exists(&self, partname: &PackURI) -> bool {
        self.parts.borrow().contains_key(partname) || self.in_archive(partname)
    }

    /// Every live partname: archive entries in archive order, then parts
    /// created since the last commit in sorted order.
    pub fn entry_names(&self) -> Vec<PackURI> {
        let mut names: Vec<PackURI> = self
            .archive
            .borrow()
            .entry_names()
            .iter()
            .filter_map(|name| PackURI::from_member_name(name).ok())
            .filter(|uri| !self.removed.contains(uri))
            .collect();

        let archived: HashSet<&PackURI> = names.iter().collect();
        let mut fresh: Vec<PackURI> = self
            .parts
            .borrow()
            .keys()
            .filter(|k| !archived.contains(k))
            .cloned()
            .collect();
        fresh.sort();

        names.extend(fresh);
        names
    }

    /// First free partname produced by substituting 1, 2, ... for `%d` in
    /// `template`, e.g. `/xl/worksheets/sheet%d.xml`.
    pub fn next_partname(&self, template: &str) -> Result<PackURI> {
        let mut buf = itoa::Buffer::new();
        for n in 1..=MAX_PARTNAME_INDEX {
            let candidate = PackURI::new(template.replace("%d", buf.format(n)))?;
            if !self.exists(&candidate) {
                return Ok(candidate);
            }
        }
        Err(OpcError::InvalidPackUri(format!(
            "no free partname for template '{}'",
            template
        )))
    }

    /// Stage raw bytes for `partname` directly into the archive, dropping any
    /// cached tree for it.
    pub fn write_raw(&mut self, partname: &PackURI, bytes: Vec<u8>) -> Result<()> {
        self.parts.get_mut().remove(partname);
        self.removed.remove(partname);
        self.archive
            .get_mut()
            .write_entry(partname.membername(), bytes)?;
        Ok(())
    }

    /// Stage every dirty part and every removal into the archive.
    ///
    /// Returns the number of parts written.
    pub fn commit(&mut self) -> Result<usize> {
        let archive = self.archive.get_mut();
        for partname in self.removed.drain() {
            archive.delete_entry(partname.membername())?;
        }

        let mut written = 0;
        for (partname, part) in self.parts.get_mut().iter() {
            let mut part = part.borrow_mut();
            if !part.is_dirty() {
                continue;
            }
            archive.write_entry(partname.membername(), part.to_bytes()?)?;
            part.mark_clean();
            written += 1;
        }
        Ok(written)
    }

    /// Write the archive to `dest`.
    pub fn persist(&mut self, dest: &Path, options: &PackageOptions) -> Result<()> {
        self.archive.get_mut().persist(dest, options)?;
        Ok(())
    }

    /// Number of cached parts.
    pub fn cached_len(&self) -> usize {
        self.parts.borrow().len()
    }
}

impl std::fmt::Debug for PartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartStore")
            .field("cached", &self.parts.borrow().len())
            .field("removed", &self.removed.len())
            .finish()
    }
}
