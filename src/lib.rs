//! Longan - a package model for Office Open XML spreadsheets
//!
//! This library opens, edits and writes `.xlsx` workbooks at the package
//! level: the ZIP container, the XML parts inside it, the relationship graph
//! between them and the content-type registry that describes them.
//!
//! # Features
//!
//! - **Lazy parts**: parts are parsed the first time they are needed and
//!   cached behind shared handles, so every caller sees the same tree
//! - **Consistent saves**: relationship targets and content types are checked
//!   before anything is written, and the file is replaced atomically
//! - **Sheet management**: add, clone, rename, move and delete worksheets with
//!   all dependent bookkeeping updated together
//! - **Document properties**: read and write core and extended properties
//!
//! # Example
//!
//! ```no_run
//! use longan::xlsx::{Command, Document, Property, Query};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut doc = Document::new();
//! doc.open("budget.xlsx")?;
//!
//! doc.execute_command(Command::RenameWorksheet {
//!     old_name: "Sheet1".into(),
//!     new_name: "Summary".into(),
//! })?;
//! doc.set_property(Property::Title, "Budget 2025")?;
//!
//! println!("sheets: {}", doc.execute_query(&Query::SheetCount)?);
//! doc.save_as("budget-2025.xlsx")?;
//! # Ok(())
//! # }
//! ```

/// Shared utilities (XML tree).
pub mod common;

/// Open Packaging Conventions layer: archive, parts, relationships and
/// content types.
pub mod opc;

/// Spreadsheet document built on the package layer.
pub mod xlsx;

pub use xlsx::{Command, Document, DocumentState, PackageAccess, Property, Query, XlsxError};
