use super::*;
use crate::common::xml::XmlElement;
use crate::opc::constants::{content_type as ct, relationship_type as rt};
use crate::opc::error::OpcError;
use crate::opc::packuri::PackURI;
use crate::xlsx::properties::sheet_titles;
use crate::xlsx::{Command, PackageAccess, PartOwner, Query, XlsxError};
use std::rc::Rc;

fn uri(s: &str) -> PackURI {
    PackURI::new(s).expect("valid partname")
}

fn add_sheet(doc: &mut Document, name: &str) {
    doc.execute_command(Command::AddWorksheet { name: name.into() })
        .expect("add worksheet");
}

fn app_titles(doc: &Document) -> Vec<String> {
    let app = doc.xml_part(&uri("/docProps/app.xml")).expect("app part");
    let mut app = app.borrow_mut();
    sheet_titles(app.document().expect("parse app.xml"))
}

fn query(doc: &Document, query: Query) -> String {
    doc.execute_query(&query).expect("query")
}

#[test]
fn add_worksheet_registers_part_rel_and_title() {
    let (_dir, _path, mut doc) = created_document("add.xlsx");
    add_sheet(&mut doc, "Data");

    assert_eq!(query(&doc, Query::SheetCount), "2");
    assert_eq!(query(&doc, Query::SheetIndex { name: "data".into() }), "1");
    assert_eq!(query(&doc, Query::SheetId { name: "Data".into() }), "2");
    assert_eq!(
        query(&doc, Query::SheetPath { name: "Data".into() }),
        "/xl/worksheets/sheet2.xml"
    );
    assert_eq!(
        query(
            &doc,
            Query::ContentType {
                partname: uri("/xl/worksheets/sheet2.xml")
            }
        ),
        ct::SML_WORKSHEET
    );
    assert_eq!(app_titles(&doc), ["Sheet1", "Data"]);

    // rId1 is Sheet1 and rId2 the styles part.
    let entry = doc.workbook().unwrap().require("Data").unwrap().1;
    assert_eq!(entry.rel_id, "rId3");
    assert_eq!(
        query(
            &doc,
            Query::RelationshipTarget {
                owner: PartOwner::Workbook,
                id: "rId3".into()
            }
        ),
        "worksheets/sheet2.xml"
    );
}

#[test]
fn invalid_sheet_names_are_rejected() {
    let (_dir, _path, mut doc) = created_document("names.xlsx");
    let long = "x".repeat(32);
    for name in ["", "a/b", "what?", "[x]", "'quoted'", long.as_str()] {
        let err = doc
            .execute_command(Command::AddWorksheet { name: name.into() })
            .unwrap_err();
        assert!(matches!(err, XlsxError::InvalidSheetName { .. }), "{name}: {err}");
    }
    assert_eq!(query(&doc, Query::SheetCount), "1");
}

#[test]
fn delete_last_sheet_is_refused() {
    let (_dir, _path, mut doc) = created_document("last.xlsx");
    let err = doc
        .execute_command(Command::DeleteWorksheet {
            name: "Sheet1".into(),
        })
        .unwrap_err();
    assert!(matches!(err, XlsxError::LastSheet(_)));
    assert_eq!(query(&doc, Query::SheetCount), "1");

    assert!(matches!(
        doc.execute_command(Command::DeleteWorksheet { name: "Nope".into() }),
        Err(XlsxError::SheetNotFound(_))
    ));
}

#[test]
fn delete_worksheet_drops_calc_chain() {
    let (_dir, path, mut doc) = created_document("calc.xlsx");
    add_sheet(&mut doc, "Data");
    doc.execute_command(Command::AddPart {
        partname: uri("/xl/calcChain.xml"),
        content_type: ct::SML_CALC_CHAIN.into(),
        relationship_type: rt::CALC_CHAIN.into(),
        owner: PartOwner::Workbook,
        content: br#"<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="A1" i="2"/></calcChain>"#.to_vec(),
    })
    .unwrap();

    doc.execute_command(Command::DeleteWorksheet {
        name: "Data".into(),
    })
    .unwrap();
    assert_eq!(
        query(&doc, Query::PartExists { partname: uri("/xl/calcChain.xml") }),
        "false"
    );
    assert!(doc
        .relationships_of_type(PartOwner::Workbook, rt::CALC_CHAIN)
        .unwrap()
        .is_empty());
    assert_eq!(app_titles(&doc), ["Sheet1"]);

    doc.save().unwrap();
    assert!(!entry_names(&path).iter().any(|n| n == "xl/calcChain.xml"));
}

#[test]
fn delete_worksheet_updates_defined_names_and_active_tab() {
    let (_dir, _path, mut doc) = created_document("names.xlsx");
    add_sheet(&mut doc, "B");
    add_sheet(&mut doc, "C");

    let workbook = doc.workbook().unwrap().part().clone();
    {
        let mut part = workbook.borrow_mut();
        let root = part.document_mut().unwrap().root_mut();
        root.child_or_insert("bookViews")
            .child_or_insert("workbookView")
            .set_attribute("activeTab", "2");
        let names = root.child_or_insert("definedNames");
        names.append(
            XmlElement::new("definedName")
                .with_attribute("name", "InB")
                .with_attribute("localSheetId", "1")
                .with_text("B!$A$1"),
        );
        names.append(
            XmlElement::new("definedName")
                .with_attribute("name", "InC")
                .with_attribute("localSheetId", "2")
                .with_text("C!$A$1"),
        );
    }

    doc.execute_command(Command::DeleteWorksheet { name: "B".into() })
        .unwrap();

    let mut part = workbook.borrow_mut();
    let root = part.document().unwrap().root();
    let names: Vec<_> = root
        .child("definedNames")
        .unwrap()
        .elements()
        .map(|e| (e.attribute("name").unwrap(), e.attribute("localSheetId").unwrap()))
        .collect();
    assert_eq!(names, [("InC", "1")]);
    let view = root.child("bookViews").unwrap().child("workbookView").unwrap();
    assert_eq!(view.attribute("activeTab"), Some("1"));
}

#[test]
fn rename_worksheet() {
    let (_dir, _path, mut doc) = created_document("rename.xlsx");
    add_sheet(&mut doc, "Data");

    doc.execute_command(Command::RenameWorksheet {
        old_name: "Data".into(),
        new_name: "Figures".into(),
    })
    .unwrap();
    assert_eq!(doc.workbook().unwrap().sheet_names().unwrap(), ["Sheet1", "Figures"]);
    assert_eq!(app_titles(&doc), ["Sheet1", "Figures"]);

    // Changing only the case is allowed.
    doc.execute_command(Command::RenameWorksheet {
        old_name: "figures".into(),
        new_name: "FIGURES".into(),
    })
    .unwrap();
    assert_eq!(doc.workbook().unwrap().sheet_names().unwrap(), ["Sheet1", "FIGURES"]);

    let err = doc
        .execute_command(Command::RenameWorksheet {
            old_name: "FIGURES".into(),
            new_name: "sheet1".into(),
        })
        .unwrap_err();
    assert!(matches!(err, XlsxError::SheetNameCollision(_)));
}

#[test]
fn clone_worksheet_copies_content_without_relationships() {
    let (_dir, _path, mut doc) = created_document("clone.xlsx");
    add_sheet(&mut doc, "Tail");

    let source = doc.xml_part(&uri("/xl/worksheets/sheet1.xml")).unwrap();
    {
        let mut part = source.borrow_mut();
        let root = part.document_mut().unwrap().root_mut();
        root.child_or_insert("sheetData").append(
            XmlElement::new("row")
                .with_attribute("r", "1")
                .with_child(XmlElement::new("c").with_attribute("r", "A1")),
        );
        root.append(XmlElement::new("drawing").with_attribute("r:id", "rId1"));
        root.child_or_insert("sheetViews")
            .child_or_insert("sheetView")
            .set_attribute("tabSelected", "1");
    }

    doc.execute_command(Command::CloneWorksheet {
        source: "Sheet1".into(),
        name: "Copy".into(),
    })
    .unwrap();

    assert_eq!(
        doc.workbook().unwrap().sheet_names().unwrap(),
        ["Sheet1", "Copy", "Tail"]
    );
    assert_eq!(app_titles(&doc), ["Sheet1", "Copy", "Tail"]);
    let path = query(&doc, Query::SheetPath { name: "Copy".into() });
    assert_eq!(path, "/xl/worksheets/sheet3.xml");
    assert_eq!(query(&doc, Query::SheetId { name: "Copy".into() }), "3");

    let copy = doc.xml_part(&uri(&path)).unwrap();
    assert!(!Rc::ptr_eq(&copy, &source));
    let mut copy = copy.borrow_mut();
    let root = copy.document().unwrap().root();
    assert!(root.child("sheetData").unwrap().child("row").is_some());
    assert!(root.child("drawing").is_none());
    let view = root.child("sheetViews").unwrap().child("sheetView").unwrap();
    assert_eq!(view.attribute("tabSelected"), None);

    // The source keeps everything.
    let mut source = source.borrow_mut();
    assert!(source.document().unwrap().root().child("drawing").is_some());
}

#[test]
fn clone_worksheet_keeps_later_sheet_references() {
    let (_dir, path, mut doc) = created_document("clone-names.xlsx");
    add_sheet(&mut doc, "B");
    {
        let workbook = doc.workbook().unwrap().part().clone();
        let mut part = workbook.borrow_mut();
        let root = part.document_mut().unwrap().root_mut();
        root.child_or_insert("bookViews")
            .child_or_insert("workbookView")
            .set_attribute("activeTab", "1");
        root.child_or_insert("definedNames").append(
            XmlElement::new("definedName")
                .with_attribute("name", "onB")
                .with_attribute("localSheetId", "1")
                .with_text("B!$A$1"),
        );
    }

    doc.execute_command(Command::CloneWorksheet {
        source: "Sheet1".into(),
        name: "Copy".into(),
    })
    .unwrap();
    assert_eq!(query(&doc, Query::SheetIndex { name: "B".into() }), "2");
    doc.save().unwrap();

    let doc = reopen(&path);
    let workbook = doc.workbook().unwrap().part().clone();
    let mut part = workbook.borrow_mut();
    let root = part.document().unwrap().root();
    let name = root.child("definedNames").unwrap().child("definedName").unwrap();
    assert_eq!(name.attribute("localSheetId"), Some("2"));
    let view = root.child("bookViews").unwrap().child("workbookView").unwrap();
    assert_eq!(view.attribute("activeTab"), Some("2"));
}

#[test]
fn queries_run_while_the_workbook_is_borrowed() {
    let (_dir, _path, doc) = created_document("shared.xlsx");
    let workbook = doc.workbook().unwrap().part().clone();
    let held = workbook.borrow();
    assert_eq!(query(&doc, Query::SheetCount), "1");
    assert_eq!(query(&doc, Query::SheetExists { name: "Sheet1".into() }), "true");
    drop(held);
}

#[test]
fn move_worksheet_clamps_and_keeps_titles_in_order() {
    let (_dir, _path, mut doc) = created_document("move.xlsx");
    add_sheet(&mut doc, "B");
    add_sheet(&mut doc, "C");

    doc.execute_command(Command::MoveWorksheet {
        name: "Sheet1".into(),
        index: 99,
    })
    .unwrap();
    assert_eq!(doc.workbook().unwrap().sheet_names().unwrap(), ["B", "C", "Sheet1"]);
    assert_eq!(app_titles(&doc), ["B", "C", "Sheet1"]);

    doc.execute_command(Command::MoveWorksheet {
        name: "C".into(),
        index: 0,
    })
    .unwrap();
    assert_eq!(doc.workbook().unwrap().sheet_names().unwrap(), ["C", "B", "Sheet1"]);
    assert_eq!(query(&doc, Query::SheetIndex { name: "sheet1".into() }), "2");
}

#[test]
fn add_and_delete_custom_part() {
    let (_dir, path, mut doc) = created_document("custom.xlsx");
    let item = uri("/customXml/item1.xml");
    let command = Command::AddPart {
        partname: item.clone(),
        content_type: "application/vnd.example.item+xml".into(),
        relationship_type: "http://example.com/relationships/item".into(),
        owner: PartOwner::Package,
        content: b"<item>42</item>".to_vec(),
    };
    doc.execute_command(command.clone()).unwrap();

    assert_eq!(query(&doc, Query::PartExists { partname: item.clone() }), "true");
    assert_eq!(
        doc.content_type_of(&item).unwrap(),
        "application/vnd.example.item+xml"
    );
    let rels = doc
        .relationships_of_type(PartOwner::Package, "http://example.com/relationships/item")
        .unwrap();
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].target_ref(), "customXml/item1.xml");
    // rId1..rId3 are taken by the workbook and property parts.
    assert_eq!(rels[0].r_id(), "rId4");

    assert!(matches!(
        doc.execute_command(command),
        Err(XlsxError::Opc(OpcError::DuplicatePart(_)))
    ));

    doc.save().unwrap();
    assert!(entry_text(&path, "customXml/item1.xml").contains("<item>42</item>"));

    let mut doc = reopen(&path);
    doc.execute_command(Command::DeletePart { partname: item.clone() })
        .unwrap();
    assert_eq!(query(&doc, Query::PartExists { partname: item.clone() }), "false");
    assert!(doc
        .relationships_of_type(PartOwner::Package, "http://example.com/relationships/item")
        .unwrap()
        .is_empty());
    doc.save().unwrap();
    assert!(!entry_text(&path, "[Content_Types].xml").contains("customXml"));
    assert!(!entry_text(&path, "_rels/.rels").contains("customXml"));
}

#[test]
fn add_part_rejects_malformed_xml() {
    let (_dir, _path, mut doc) = created_document("bad.xlsx");
    let partname = uri("/xl/broken.xml");
    let err = doc
        .execute_command(Command::AddPart {
            partname: partname.clone(),
            content_type: ct::XML.into(),
            relationship_type: "http://example.com/relationships/broken".into(),
            owner: PartOwner::Workbook,
            content: b"<open>".to_vec(),
        })
        .unwrap_err();
    assert!(matches!(err, XlsxError::Opc(OpcError::MalformedXml { .. })), "{err}");
    assert_eq!(query(&doc, Query::PartExists { partname }), "false");
}

#[test]
fn delete_part_guards() {
    let (_dir, _path, mut doc) = created_document("guards.xlsx");
    for partname in ["/xl/workbook.xml", "/[Content_Types].xml", "/_rels/.rels"] {
        let err = doc
            .execute_command(Command::DeletePart {
                partname: uri(partname),
            })
            .unwrap_err();
        assert!(matches!(err, XlsxError::PackageIntegrity(_)), "{partname}: {err}");
    }
    assert!(matches!(
        doc.execute_command(Command::DeletePart {
            partname: uri("/xl/missing.xml")
        }),
        Err(XlsxError::Opc(OpcError::PartNotFound(_)))
    ));

    // A worksheet part is deleted as a sheet.
    add_sheet(&mut doc, "Data");
    doc.execute_command(Command::DeletePart {
        partname: uri("/xl/worksheets/sheet2.xml"),
    })
    .unwrap();
    assert_eq!(query(&doc, Query::SheetExists { name: "Data".into() }), "false");
    assert_eq!(app_titles(&doc), ["Sheet1"]);
}

#[test]
fn get_or_create_part_from_template() {
    let (_dir, path, mut doc) = created_document("sst.xlsx");
    let sst = uri("/xl/sharedStrings.xml");

    let first = doc
        .get_or_create_xml_part(&sst, ct::SML_SHARED_STRINGS, rt::SHARED_STRINGS)
        .unwrap();
    let second = doc
        .get_or_create_xml_part(&sst, ct::SML_SHARED_STRINGS, rt::SHARED_STRINGS)
        .unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(
        doc.relationships_of_type(PartOwner::Workbook, rt::SHARED_STRINGS)
            .unwrap()
            .len(),
        1
    );
    assert_eq!(first.borrow_mut().document().unwrap().root().local_name(), "sst");

    assert!(matches!(
        doc.get_or_create_xml_part(&uri("/xl/theme/theme1.xml"), ct::OFC_THEME, rt::THEME),
        Err(XlsxError::NoTemplate(_))
    ));
    assert!(matches!(
        doc.get_or_create_xml_part(&PackURI::content_types(), ct::XML, rt::STYLES),
        Err(XlsxError::PackageIntegrity(_))
    ));

    doc.save().unwrap();
    assert!(entry_text(&path, "[Content_Types].xml").contains("/xl/sharedStrings.xml"));
    assert!(entry_text(&path, "xl/_rels/workbook.xml.rels").contains("sharedStrings.xml"));
}

#[test]
fn relationship_ids_are_not_reused_after_reopen() {
    let (_dir, path, mut doc) = created_document("ids.xlsx");
    add_sheet(&mut doc, "Temp");
    let temp_id = doc.workbook().unwrap().require("Temp").unwrap().1.rel_id;
    doc.execute_command(Command::DeleteWorksheet { name: "Temp".into() })
        .unwrap();
    doc.save().unwrap();

    let mut doc = reopen(&path);
    add_sheet(&mut doc, "Next");
    let next_id = doc.workbook().unwrap().require("Next").unwrap().1.rel_id;
    // The deleted id was the highest, so after reopening it is free again;
    // within one session it never is.
    assert_eq!(next_id, temp_id);

    add_sheet(&mut doc, "Other");
    doc.execute_command(Command::DeleteWorksheet { name: "Other".into() })
        .unwrap();
    add_sheet(&mut doc, "Last");
    let last_id = doc.workbook().unwrap().require("Last").unwrap().1.rel_id;
    assert_ne!(last_id, next_id);
    assert_eq!(last_id, "rId5");
}

#[test]
fn queries_report_missing_things() {
    let (_dir, _path, doc) = created_document("q.xlsx");
    assert_eq!(query(&doc, Query::SheetExists { name: "sheet1".into() }), "true");
    assert!(matches!(
        doc.execute_query(&Query::SheetIndex { name: "Nope".into() }),
        Err(XlsxError::SheetNotFound(_))
    ));
    assert!(matches!(
        doc.execute_query(&Query::RelationshipTarget {
            owner: PartOwner::Package,
            id: "rId99".into()
        }),
        Err(XlsxError::Opc(OpcError::RelationshipNotFound(_)))
    ));
    assert!(matches!(
        doc.execute_query(&Query::ContentType {
            partname: uri("/media/image.png")
        }),
        Err(XlsxError::Opc(OpcError::UnknownContentType(_)))
    ));
    assert_eq!(
        query(&doc, Query::PartExists { partname: PackURI::content_types() }),
        "true"
    );
}
