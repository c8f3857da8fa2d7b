//! Sheet list view over `xl/workbook.xml`.
//!
//! [`Workbook`] reads and edits the `<sheets>` element of the workbook part
//! through the shared part handle, so changes are visible to every other
//! holder of that handle and are written back on save.

use crate::common::xml::{XmlDocument, XmlElement};
use crate::opc::constants::namespace;
use crate::opc::part::XmlPartRef;
use crate::xlsx::error::{Result, XlsxError};

/// Longest sheet name Excel accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN_SHEET_NAME_CHARS: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

/// Visibility of a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetState {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("hidden") => SheetState::Hidden,
            Some("veryHidden") => SheetState::VeryHidden,
            _ => SheetState::Visible,
        }
    }
}

/// One `<sheet>` entry of the workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    /// Id of the workbook relationship pointing at the sheet part.
    pub rel_id: String,
    pub state: SheetState,
}

impl SheetEntry {
    fn from_element(element: &XmlElement) -> Self {
        Self {
            name: element.attribute("name").unwrap_or_default().to_string(),
            sheet_id: element
                .attribute("sheetId")
                .and_then(|v| atoi_simd::parse::<u32>(v.as_bytes()).ok())
                .unwrap_or(0),
            rel_id: element.attribute_local("id").unwrap_or_default().to_string(),
            state: SheetState::parse(element.attribute("state")),
        }
    }
}

/// Check `name` against Excel's sheet naming rules. Uniqueness is checked
/// separately against the workbook.
pub fn validate_sheet_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(XlsxError::InvalidSheetName {
            name: name.to_string(),
            reason,
        })
    };
    let len = name.chars().count();
    if len == 0 {
        return invalid("name is empty");
    }
    if len > MAX_SHEET_NAME_LEN {
        return invalid("name is longer than 31 characters");
    }
    if name.contains(FORBIDDEN_SHEET_NAME_CHARS) {
        return invalid("name contains one of : \\ / ? * [ ]");
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return invalid("name starts or ends with an apostrophe");
    }
    Ok(())
}

/// View of the workbook part's sheet list.
#[derive(Debug, Clone)]
pub struct Workbook {
    part: XmlPartRef,
}

impl Workbook {
    pub fn new(part: XmlPartRef) -> Self {
        Self { part }
    }

    /// The underlying part handle.
    pub fn part(&self) -> &XmlPartRef {
        &self.part
    }

    fn read<T>(&self, f: impl FnOnce(&XmlDocument) -> T) -> Result<T> {
        {
            let part = self.part.borrow();
            if let Some(doc) = part.parsed() {
                return Ok(f(doc));
            }
        }
        let mut part = self.part.borrow_mut();
        Ok(f(part.document()?))
    }

    fn write<T>(&self, f: impl FnOnce(&mut XmlDocument) -> Result<T>) -> Result<T> {
        let mut part = self.part.borrow_mut();
        f(part.document_mut()?)
    }

    /// Sheets in workbook order.
    pub fn sheets(&self) -> Result<Vec<SheetEntry>> {
        self.read(|doc| {
            doc.root()
                .child("sheets")
                .map(|sheets| {
                    sheets
                        .elements()
                        .filter(|e| e.local_name() == "sheet")
                        .map(SheetEntry::from_element)
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    pub fn sheet_names(&self) -> Result<Vec<String>> {
        Ok(self.sheets()?.into_iter().map(|s| s.name).collect())
    }

    pub fn sheet_count(&self) -> Result<usize> {
        Ok(self.sheets()?.len())
    }

    /// Position and entry of the sheet called `name` (case-insensitive).
    pub fn find(&self, name: &str) -> Result<Option<(usize, SheetEntry)>> {
        Ok(self
            .sheets()?
            .into_iter()
            .enumerate()
            .find(|(_, s)| s.name.to_lowercase() == name.to_lowercase()))
    }

    pub fn sheet_exists(&self, name: &str) -> Result<bool> {
        Ok(self.find(name)?.is_some())
    }

    /// Like [`find`](Self::find), but a missing sheet is an error.
    pub fn require(&self, name: &str) -> Result<(usize, SheetEntry)> {
        self.find(name)?
            .ok_or_else(|| XlsxError::SheetNotFound(name.to_string()))
    }

    /// Smallest sheetId larger than every id in use.
    pub fn next_sheet_id(&self) -> Result<u32> {
        Ok(self
            .sheets()?
            .iter()
            .map(|s| s.sheet_id)
            .max()
            .unwrap_or(0)
            .saturating_add(1))
    }

    /// Append a `<sheet>` element, or insert it at `index` when given.
    pub(crate) fn insert_sheet(&self, index: Option<usize>, entry: &SheetEntry) -> Result<()> {
        self.write(|doc| {
            let prefix = relationships_prefix(doc.root_mut());
            let mut element = XmlElement::new("sheet")
                .with_attribute("name", &entry.name)
                .with_attribute("sheetId", itoa::Buffer::new().format(entry.sheet_id));
            match entry.state {
                SheetState::Visible => {},
                SheetState::Hidden => element.set_attribute("state", "hidden"),
                SheetState::VeryHidden => element.set_attribute("state", "veryHidden"),
            }
            element.set_attribute(&format!("{}:id", prefix), &entry.rel_id);

            let sheets = sheets_mut(doc);
            let Some(index) = index else {
                sheets.append(element);
                return Ok(());
            };
            sheets.insert_element(index, element);

            let shift = |i: usize| if i >= index { i + 1 } else { i };
            remap_local_sheet_ids(doc, |id| Some(shift(id)));
            for view in workbook_views_mut(doc) {
                adjust_view_index(view, "activeTab", shift);
                adjust_view_index(view, "firstSheet", shift);
            }
            Ok(())
        })
    }

    /// Remove the sheet at `index` and keep the workbook views pointing at
    /// existing sheets. Names scoped to the removed sheet are dropped.
    pub(crate) fn remove_sheet(&self, index: usize) -> Result<()> {
        self.write(|doc| {
            let sheets = sheets_mut(doc);
            sheets.remove_element(index);
            let remaining = sheets.elements().count();
            remap_local_sheet_ids(doc, |id| match id.cmp(&index) {
                std::cmp::Ordering::Less => Some(id),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(id - 1),
            });
            for view in workbook_views_mut(doc) {
                adjust_view_index(view, "activeTab", |tab| {
                    if tab > index || tab >= remaining { tab.saturating_sub(1) } else { tab }
                });
                adjust_view_index(view, "firstSheet", |first| {
                    if first > index || first >= remaining { first.saturating_sub(1) } else { first }
                });
            }
            Ok(())
        })
    }

    pub(crate) fn rename_sheet(&self, index: usize, new_name: &str) -> Result<()> {
        self.write(|doc| {
            if let Some(sheet) = sheets_mut(doc).elements_mut().nth(index) {
                sheet.set_attribute("name", new_name);
            }
            Ok(())
        })
    }

    /// Move the sheet at `from` to position `to`. The active tab follows the
    /// sheet it pointed at.
    pub(crate) fn move_sheet(&self, from: usize, to: usize) -> Result<()> {
        self.write(|doc| {
            let sheets = sheets_mut(doc);
            if let Some(element) = sheets.remove_element(from) {
                sheets.insert_element(to, element);
            }
            remap_local_sheet_ids(doc, |id| Some(moved_index(id, from, to)));
            for view in workbook_views_mut(doc) {
                adjust_view_index(view, "activeTab", |tab| moved_index(tab, from, to));
                adjust_view_index(view, "firstSheet", |first| moved_index(first, from, to));
            }
            Ok(())
        })
    }
}

/// Where index `i` ends up after moving the element at `from` to `to`.
fn moved_index(i: usize, from: usize, to: usize) -> usize {
    if i == from {
        to
    } else if from < i && i <= to {
        i - 1
    } else if to <= i && i < from {
        i + 1
    } else {
        i
    }
}

/// Rewrite `localSheetId` of every defined name; `None` drops the name.
fn remap_local_sheet_ids(doc: &mut XmlDocument, f: impl Fn(usize) -> Option<usize>) {
    let Some(names) = doc.root_mut().child_mut("definedNames") else {
        return;
    };
    names.retain_elements(|name| {
        name.attribute("localSheetId")
            .and_then(|v| atoi_simd::parse::<usize>(v.as_bytes()).ok())
            .is_none_or(|id| f(id).is_some())
    });
    for name in names.elements_mut() {
        let Some(id) = name
            .attribute("localSheetId")
            .and_then(|v| atoi_simd::parse::<usize>(v.as_bytes()).ok())
        else {
            continue;
        };
        if let Some(updated) = f(id) {
            name.set_attribute("localSheetId", itoa::Buffer::new().format(updated));
        }
    }
}

fn sheets_mut(doc: &mut XmlDocument) -> &mut XmlElement {
    doc.root_mut().child_or_insert("sheets")
}

fn workbook_views_mut(doc: &mut XmlDocument) -> impl Iterator<Item = &mut XmlElement> {
    doc.root_mut()
        .child_mut("bookViews")
        .into_iter()
        .flat_map(|views| views.elements_mut())
        .filter(|e| e.local_name() == "workbookView")
}

fn adjust_view_index(view: &mut XmlElement, attr: &str, f: impl FnOnce(usize) -> usize) {
    let Some(current) = view
        .attribute(attr)
        .and_then(|v| atoi_simd::parse::<usize>(v.as_bytes()).ok())
    else {
        return;
    };
    let updated = f(current);
    if updated != current {
        view.set_attribute(attr, itoa::Buffer::new().format(updated));
    }
}

/// Prefix bound to the office relationships namespace on the root element,
/// declaring `xmlns:r` when the workbook has none.
fn relationships_prefix(root: &mut XmlElement) -> String {
    match root.namespace_prefix(namespace::OFC_RELATIONSHIPS) {
        Some(prefix) if !prefix.is_empty() => prefix.to_string(),
        _ => {
            root.set_attribute("xmlns:r", namespace::OFC_RELATIONSHIPS);
            "r".to_string()
        },
    }
}
