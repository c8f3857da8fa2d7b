//! Document tests that go through real files on disk.

mod commands;

use crate::opc::archive::{Archive, ZipArchiveStore};
use crate::opc::options::PackageOptions;
use crate::xlsx::Document;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub(super) const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

pub(super) const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

pub(super) const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Only" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

pub(super) const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

pub(super) const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;

/// Entries of a hand-built package with one sheet and no property parts.
pub(super) fn minimal_entries() -> Vec<(&'static str, &'static str)> {
    vec![
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", SHEET),
    ]
}

/// Write a ZIP archive with the given entries.
pub(super) fn write_package(path: &Path, entries: &[(&str, &str)]) {
    let mut archive = ZipArchiveStore::new();
    for (name, text) in entries {
        archive
            .write_entry(name, text.as_bytes().to_vec())
            .expect("stage entry");
    }
    archive
        .persist(path, &PackageOptions::default())
        .expect("write package");
}

pub(super) fn entry_names(path: &Path) -> Vec<String> {
    ZipArchiveStore::open(path, &PackageOptions::default())
        .expect("open archive")
        .entry_names()
}

pub(super) fn entry_text(path: &Path, name: &str) -> String {
    let bytes = ZipArchiveStore::open(path, &PackageOptions::default())
        .expect("open archive")
        .read_entry(name)
        .expect("read entry");
    String::from_utf8(bytes).expect("utf-8 entry")
}

/// A freshly created document whose path lies in a temporary directory.
pub(super) fn created_document(file_name: &str) -> (TempDir, PathBuf, Document) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(file_name);
    let mut doc = Document::new();
    doc.create(&path).expect("create document");
    (dir, path, doc)
}

/// Open `path` in a new document.
pub(super) fn reopen(path: &Path) -> Document {
    let mut doc = Document::new();
    doc.open(path).expect("reopen document");
    doc
}
